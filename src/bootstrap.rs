// bootstrap.rs - Kernel verification and the Forth-source half of the system

use crate::errors::ForthError;
use crate::primitives::{SourceKind, VM};

/// The Forth-level half of the kernel. Control structures, defining words,
/// string literals and the rest are ordinary source fed through EVALUATE
/// once the Rust primitives exist.
const CORE_SOURCE: &str = include_str!("core.fth");

/// Words the inner interpreter and compiler cannot run without.
const SENTINELS: &[&str] = &[
    "EXIT",
    "(lit)",
    "(branch)",
    "(zbranch)",
    "(does)",
    "(;)",
    "INTERPRET",
    "QUIT",
];

/// A fully booted interpreter: primitives registered, sentinels verified,
/// core definitions loaded.
pub struct Forth {
    pub vm: VM,
}

impl Forth {
    /// Build the VM and extend it with the core definitions. A missing
    /// sentinel is an initialization fault; the caller should exit nonzero.
    pub fn new() -> Result<Self, ForthError> {
        let mut vm = VM::new();
        for &name in SENTINELS {
            if vm.dictionary.find(name.as_bytes()).is_none() {
                return Err(ForthError::Init(name));
            }
        }
        for line in CORE_SOURCE.lines() {
            vm.evaluate(line)?;
        }
        Ok(Forth { vm })
    }

    /// Interpret one line of terminal input.
    pub fn interpret_line(&mut self, line: &str) -> Result<(), ForthError> {
        self.vm.set_source(line.as_bytes(), SourceKind::Terminal);
        self.vm.interpret()
    }

    /// Include and interpret a source file, line by line.
    pub fn include_file(&mut self, path: &str) -> Result<(), ForthError> {
        self.vm.include_path(path)
    }

    pub fn is_compiling(&self) -> bool {
        self.vm.is_compiling()
    }

    /// The top loop's abort recovery: both stacks cleared, interpretation
    /// state restored. Dictionary and data space keep whatever was built.
    pub fn reset_after_abort(&mut self) {
        self.vm.reset_after_abort();
    }
}
