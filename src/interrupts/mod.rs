pub mod entry;
pub mod gdt;
pub mod idt;

pub fn init() {
    gdt::init();
    idt::init();
    unsafe { idt::PICS.lock().initialize() };
    crate::log_info!("GDT, IDT and PICs initialized.");
}
