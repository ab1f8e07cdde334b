// errors.rs - Error and abort control

use std::fmt;

/// Any condition that unwinds Forth execution back to the top-level loop,
/// plus the control signals QUIT and BYE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForthError {
    StackUnderflow(&'static str),
    StackOverflow(&'static str),
    ReturnStackUnderflow(&'static str),
    ReturnStackOverflow(&'static str),
    UnalignedAddress(&'static str),
    InvalidAddress(&'static str),
    DataSpaceOverflow(&'static str),
    ZeroDivisor(&'static str),
    DelimiterNotFound(&'static str),
    UnknownWord(String),
    MissingName(&'static str),
    /// ABORT carries no message; ABORT" carries the user's string.
    Abort(Option<String>),
    /// Unwind to the top loop, reset the return stack, resume reading input.
    Quit,
    /// Leave the interpreter with a clean exit.
    Bye,
    /// A kernel sentinel was not findable at startup. Fatal.
    Init(&'static str),
    Io(String),
}

impl fmt::Display for ForthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ForthError::StackUnderflow(who) => write!(f, "{}: stack underflow", who),
            ForthError::StackOverflow(who) => write!(f, "{}: stack overflow", who),
            ForthError::ReturnStackUnderflow(who) => {
                write!(f, "{}: return stack underflow", who)
            }
            ForthError::ReturnStackOverflow(who) => {
                write!(f, "{}: return stack overflow", who)
            }
            ForthError::UnalignedAddress(who) => write!(f, "{}: unaligned address", who),
            ForthError::InvalidAddress(who) => write!(f, "{}: invalid address", who),
            ForthError::DataSpaceOverflow(who) => write!(f, "{}: data space overflow", who),
            ForthError::ZeroDivisor(who) => write!(f, "{}: zero divisor", who),
            ForthError::DelimiterNotFound(who) => write!(f, "{}: delimiter not found", who),
            ForthError::UnknownWord(token) => write!(f, "unrecognized word: {}", token),
            ForthError::MissingName(who) => write!(f, "{}: missing name", who),
            ForthError::Abort(Some(msg)) => write!(f, "{}", msg),
            ForthError::Abort(None) => Ok(()),
            ForthError::Quit => Ok(()),
            ForthError::Bye => Ok(()),
            ForthError::Init(name) => write!(f, "kernel word missing: {}", name),
            ForthError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ForthError {}

impl From<std::io::Error> for ForthError {
    fn from(error: std::io::Error) -> ForthError {
        ForthError::Io(error.to_string())
    }
}

impl ForthError {
    /// True for the errors QUIT recovers from by resetting the stacks;
    /// false for the QUIT/BYE signals and fatal initialization faults.
    pub fn is_abort(&self) -> bool {
        !matches!(
            self,
            ForthError::Quit | ForthError::Bye | ForthError::Init(_)
        )
    }

    /// True when the top loop should print the Display rendering.
    pub fn has_message(&self) -> bool {
        !matches!(
            self,
            ForthError::Abort(None) | ForthError::Quit | ForthError::Bye
        )
    }
}
