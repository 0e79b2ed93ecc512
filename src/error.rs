use core::fmt;

/// Errors reported to processes through a system call's return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysError {
    Failure,
    BadChannel,
    BadParam,
    BadPid,
    BadPriority,
    Killed,
    NotFound,
    NoChildren,
    NoData,
    NoProcs,
    BadSyscall,
}

impl SysError {
    /// The negative code placed in the caller's return register.
    pub const fn code(self) -> i32 {
        match self {
            SysError::Failure => -1,
            SysError::BadChannel => -2,
            SysError::BadParam => -3,
            SysError::BadPid => -4,
            SysError::BadPriority => -5,
            SysError::Killed => -6,
            SysError::NotFound => -7,
            SysError::NoChildren => -8,
            SysError::NoData => -9,
            SysError::NoProcs => -10,
            SysError::BadSyscall => -11,
        }
    }

    pub fn from_code(code: i32) -> Option<SysError> {
        let err = match code {
            -1 => SysError::Failure,
            -2 => SysError::BadChannel,
            -3 => SysError::BadParam,
            -4 => SysError::BadPid,
            -5 => SysError::BadPriority,
            -6 => SysError::Killed,
            -7 => SysError::NotFound,
            -8 => SysError::NoChildren,
            -9 => SysError::NoData,
            -10 => SysError::NoProcs,
            -11 => SysError::BadSyscall,
            _ => return None,
        };
        Some(err)
    }

    /// Register encoding of the code (sign-extended to 64 bits).
    pub const fn as_reg(self) -> u64 {
        self.code() as i64 as u64
    }
}

impl fmt::Display for SysError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SysError::Failure => write!(f, "Operation failed"),
            SysError::BadChannel => write!(f, "Bad I/O channel"),
            SysError::BadParam => write!(f, "Bad parameter"),
            SysError::BadPid => write!(f, "Bad process ID"),
            SysError::BadPriority => write!(f, "Bad priority"),
            SysError::Killed => write!(f, "Process was killed"),
            SysError::NotFound => write!(f, "No such process"),
            SysError::NoChildren => write!(f, "No child processes"),
            SysError::NoData => write!(f, "No data available"),
            SysError::NoProcs => write!(f, "Process table full"),
            SysError::BadSyscall => write!(f, "Bad system call code"),
        }
    }
}

pub type SysResult<T> = Result<T, SysError>;
