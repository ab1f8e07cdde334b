// outer.rs - Outer interpreter: sources, INTERPRET, numbers, QUIT, files

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Read, Write};

use crate::errors::ForthError;
use crate::primitives::{
    Cell, SourceKind, UCell, VM, FALSE, INPUT_BUFFER_ADDR, INPUT_BUFFER_SIZE, TRUE,
};

// ============================================================================
// NUMERIC CONVERSION
// ============================================================================

const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub(crate) fn unsigned_in_base(mut value: UCell, base: u32) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let base = base as UCell;
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % base) as usize]);
        value /= base;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

pub(crate) fn signed_in_base(n: Cell, base: u32) -> String {
    if n < 0 {
        format!("-{}", unsigned_in_base((n as UCell).wrapping_neg(), base))
    } else {
        unsigned_in_base(n as UCell, base)
    }
}

/// The input source saved around EVALUATE and INCLUDED.
struct SavedSource {
    buffer: Vec<u8>,
    to_in: Cell,
    kind: SourceKind,
}

impl VM {
    // ========================================================================
    // SOURCE MANAGEMENT
    // ========================================================================

    /// Install a line as the current source and rewind >IN.
    pub fn set_source(&mut self, line: &[u8], kind: SourceKind) {
        let len = line.len().min(INPUT_BUFFER_SIZE);
        self.memory[INPUT_BUFFER_ADDR..INPUT_BUFFER_ADDR + len].copy_from_slice(&line[..len]);
        self.input_length = len;
        self.set_to_in(0);
        self.source = kind;
    }

    fn save_source(&self) -> SavedSource {
        SavedSource {
            buffer: self.memory[INPUT_BUFFER_ADDR..INPUT_BUFFER_ADDR + self.input_length].to_vec(),
            to_in: self.to_in(),
            kind: self.source,
        }
    }

    fn restore_source(&mut self, saved: SavedSource) {
        self.set_source(&saved.buffer, saved.kind);
        self.set_to_in(saved.to_in);
    }

    // ========================================================================
    // THE INTERPRET LOOP
    // ========================================================================

    /// Process the current source from >IN to the end of the line.
    pub fn interpret(&mut self) -> Result<(), ForthError> {
        self.op_interpret()
    }

    pub(crate) fn op_interpret(&mut self) -> Result<(), ForthError> {
        loop {
            let caddr = self.parse_word(b' ')?;
            let len = self.memory[caddr] as usize;
            if len == 0 {
                return Ok(());
            }
            let token = self.memory[caddr + 1..caddr + 1 + len].to_vec();

            if let Some(xt) = self.dictionary.find(&token) {
                let immediate = self
                    .dictionary
                    .get(xt)
                    .map(|w| w.is_immediate())
                    .unwrap_or(false);
                if self.is_compiling() && !immediate {
                    self.data(xt as Cell, "INTERPRET")?;
                } else {
                    self.execute_xt(xt)?;
                }
            } else if let Some(n) = self.parse_number(&token) {
                if self.is_compiling() {
                    let lit = self.lit_xt as Cell;
                    self.data(lit, "INTERPRET")?;
                    self.data(n, "INTERPRET")?;
                } else {
                    self.push(n, "INTERPRET")?;
                }
            } else {
                return Err(ForthError::UnknownWord(
                    String::from_utf8_lossy(&token).into_owned(),
                ));
            }
        }
    }

    /// Signed number in the current BASE: optional leading minus, then
    /// digits 0-9 and letters (either case) up to BASE-1. The whole token
    /// must parse; accumulation wraps modulo 2^64.
    pub fn parse_number(&self, token: &[u8]) -> Option<Cell> {
        let base = self.base();
        if !(2..=36).contains(&base) {
            return None;
        }
        let base = base as UCell;

        let (negative, digits) = match token.split_first() {
            Some((b'-', rest)) => (true, rest),
            _ => (false, token),
        };
        if digits.is_empty() {
            return None;
        }

        let mut value: UCell = 0;
        for &b in digits {
            let digit = match b {
                b'0'..=b'9' => (b - b'0') as UCell,
                b'A'..=b'Z' => (b - b'A') as UCell + 10,
                b'a'..=b'z' => (b - b'a') as UCell + 10,
                _ => return None,
            };
            if digit >= base {
                return None;
            }
            value = value.wrapping_mul(base).wrapping_add(digit);
        }

        let n = value as Cell;
        Some(if negative { n.wrapping_neg() } else { n })
    }

    /// Interpret a string against a saved-and-restored source.
    pub fn evaluate(&mut self, text: &str) -> Result<(), ForthError> {
        self.evaluate_bytes(text.as_bytes())
    }

    fn evaluate_bytes(&mut self, bytes: &[u8]) -> Result<(), ForthError> {
        let saved = self.save_source();
        self.set_source(bytes, SourceKind::Text);
        let result = self.op_interpret();
        self.restore_source(saved);
        result
    }

    /// Interpret a whole file or bootstrap text, one line at a time.
    pub(crate) fn evaluate_lines(&mut self, text: &str) -> Result<(), ForthError> {
        for line in text.lines() {
            self.evaluate(line)?;
        }
        Ok(())
    }

    pub(crate) fn include_path(&mut self, path: &str) -> Result<(), ForthError> {
        let text = std::fs::read_to_string(path)?;
        self.evaluate_lines(&text)
    }

    pub(crate) fn op_evaluate(&mut self) -> Result<(), ForthError> {
        let u = self.pop("EVALUATE")?;
        let addr = self.pop("EVALUATE")?;
        let (offset, len) = self.range_offset(addr, u, "EVALUATE")?;
        let bytes = self.memory[offset..offset + len].to_vec();
        self.evaluate_bytes(&bytes)
    }

    pub(crate) fn op_refill(&mut self) -> Result<(), ForthError> {
        if self.source != SourceKind::Terminal {
            return self.push(FALSE, "REFILL");
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => self.push(FALSE, "REFILL"),
            Ok(_) => {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                self.set_source(line.as_bytes(), SourceKind::Terminal);
                self.push(TRUE, "REFILL")
            }
            Err(e) => Err(ForthError::Io(e.to_string())),
        }
    }

    // ========================================================================
    // ABORT AND CONTROL SIGNALS
    // ========================================================================

    pub(crate) fn op_abort(&mut self) -> Result<(), ForthError> {
        Err(ForthError::Abort(None))
    }

    pub(crate) fn op_abort_message(&mut self) -> Result<(), ForthError> {
        let u = self.pop("ABORT-MESSAGE")?;
        let addr = self.pop("ABORT-MESSAGE")?;
        let (offset, len) = self.range_offset(addr, u, "ABORT-MESSAGE")?;
        let message = String::from_utf8_lossy(&self.memory[offset..offset + len]).into_owned();
        Err(ForthError::Abort(Some(message)))
    }

    /// Reset the return stack and compilation state, then signal the top
    /// loop. Raising the signal from inside QUIT just lands here again, so
    /// re-entry collapses to the same reset.
    pub(crate) fn op_quit(&mut self) -> Result<(), ForthError> {
        self.return_stack.clear();
        self.set_state(0);
        self.ip = 0;
        Err(ForthError::Quit)
    }

    pub(crate) fn op_bye(&mut self) -> Result<(), ForthError> {
        Err(ForthError::Bye)
    }

    // ========================================================================
    // FILE ACCESS
    // ========================================================================

    pub(crate) fn op_included(&mut self) -> Result<(), ForthError> {
        let u = self.pop("INCLUDED")?;
        let addr = self.pop("INCLUDED")?;
        let (offset, len) = self.range_offset(addr, u, "INCLUDED")?;
        let path = String::from_utf8_lossy(&self.memory[offset..offset + len]).into_owned();
        self.include_path(&path)
    }

    pub(crate) fn op_include_file(&mut self) -> Result<(), ForthError> {
        let id = self.pop("INCLUDE-FILE")?;
        let mut file = self.take_file(id, "INCLUDE-FILE")?;
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        self.evaluate_lines(&text)
    }

    fn file_slot(&mut self, id: Cell, who: &'static str) -> Result<&mut File, ForthError> {
        if id < 0 {
            return Err(ForthError::InvalidAddress(who));
        }
        self.files
            .get_mut(id as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(ForthError::InvalidAddress(who))
    }

    fn take_file(&mut self, id: Cell, who: &'static str) -> Result<File, ForthError> {
        if id < 0 {
            return Err(ForthError::InvalidAddress(who));
        }
        self.files
            .get_mut(id as usize)
            .and_then(|slot| slot.take())
            .ok_or(ForthError::InvalidAddress(who))
    }

    fn store_file(&mut self, file: File) -> Cell {
        for (id, slot) in self.files.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(file);
                return id as Cell;
            }
        }
        self.files.push(Some(file));
        (self.files.len() - 1) as Cell
    }

    fn ior_of(error: &io::Error) -> Cell {
        error.raw_os_error().map(Cell::from).unwrap_or(-1)
    }

    pub(crate) fn op_open_file(&mut self) -> Result<(), ForthError> {
        let fam = self.pop("OPEN-FILE")?;
        let u = self.pop("OPEN-FILE")?;
        let addr = self.pop("OPEN-FILE")?;
        let (offset, len) = self.range_offset(addr, u, "OPEN-FILE")?;
        let path = String::from_utf8_lossy(&self.memory[offset..offset + len]).into_owned();

        let mut options = OpenOptions::new();
        match fam {
            0 => options.read(true),
            1 => options.write(true).create(true).truncate(true),
            _ => options.read(true).write(true).create(true),
        };

        match options.open(&path) {
            Ok(file) => {
                let id = self.store_file(file);
                self.push(id, "OPEN-FILE")?;
                self.push(0, "OPEN-FILE")
            }
            Err(e) => {
                self.push(0, "OPEN-FILE")?;
                self.push(Self::ior_of(&e), "OPEN-FILE")
            }
        }
    }

    pub(crate) fn op_close_file(&mut self) -> Result<(), ForthError> {
        let id = self.pop("CLOSE-FILE")?;
        let ior = match self.take_file(id, "CLOSE-FILE") {
            Ok(file) => {
                drop(file);
                0
            }
            Err(_) => -1,
        };
        self.push(ior, "CLOSE-FILE")
    }

    pub(crate) fn op_read_file(&mut self) -> Result<(), ForthError> {
        let id = self.pop("READ-FILE")?;
        let u = self.pop("READ-FILE")?;
        let addr = self.pop("READ-FILE")?;
        let (offset, len) = self.range_offset(addr, u, "READ-FILE")?;

        let mut buffer = vec![0u8; len];
        let result = {
            let file = self.file_slot(id, "READ-FILE")?;
            let mut read = 0;
            loop {
                match file.read(&mut buffer[read..]) {
                    Ok(0) => break Ok(read),
                    Ok(n) => {
                        read += n;
                        if read == len {
                            break Ok(read);
                        }
                    }
                    Err(e) => break Err(e),
                }
            }
        };

        match result {
            Ok(read) => {
                self.memory[offset..offset + read].copy_from_slice(&buffer[..read]);
                self.push(read as Cell, "READ-FILE")?;
                self.push(0, "READ-FILE")
            }
            Err(e) => {
                self.push(0, "READ-FILE")?;
                self.push(Self::ior_of(&e), "READ-FILE")
            }
        }
    }

    pub(crate) fn op_read_line(&mut self) -> Result<(), ForthError> {
        let id = self.pop("READ-LINE")?;
        let u = self.pop("READ-LINE")?;
        let addr = self.pop("READ-LINE")?;
        let (offset, max) = self.range_offset(addr, u, "READ-LINE")?;

        let mut line = Vec::new();
        let mut at_eof = false;
        let mut failed = None;
        {
            let file = self.file_slot(id, "READ-LINE")?;
            let mut byte = [0u8; 1];
            loop {
                match file.read(&mut byte) {
                    Ok(0) => {
                        at_eof = true;
                        break;
                    }
                    Ok(_) => {
                        if byte[0] == b'\n' {
                            break;
                        }
                        if byte[0] != b'\r' {
                            line.push(byte[0]);
                        }
                        if line.len() == max {
                            break;
                        }
                    }
                    Err(e) => {
                        failed = Some(Self::ior_of(&e));
                        break;
                    }
                }
            }
        }
        if let Some(ior) = failed {
            self.push(0, "READ-LINE")?;
            self.push(FALSE, "READ-LINE")?;
            return self.push(ior, "READ-LINE");
        }

        let more = !(at_eof && line.is_empty());
        self.memory[offset..offset + line.len()].copy_from_slice(&line);
        self.push(line.len() as Cell, "READ-LINE")?;
        self.push(if more { TRUE } else { FALSE }, "READ-LINE")?;
        self.push(0, "READ-LINE")
    }

    pub(crate) fn op_write_file(&mut self) -> Result<(), ForthError> {
        let id = self.pop("WRITE-FILE")?;
        let u = self.pop("WRITE-FILE")?;
        let addr = self.pop("WRITE-FILE")?;
        let (offset, len) = self.range_offset(addr, u, "WRITE-FILE")?;
        let bytes = self.memory[offset..offset + len].to_vec();

        let ior = {
            let file = self.file_slot(id, "WRITE-FILE")?;
            match file.write_all(&bytes) {
                Ok(()) => 0,
                Err(e) => Self::ior_of(&e),
            }
        };
        self.push(ior, "WRITE-FILE")
    }

    pub(crate) fn op_write_line(&mut self) -> Result<(), ForthError> {
        let id = self.pop("WRITE-LINE")?;
        let u = self.pop("WRITE-LINE")?;
        let addr = self.pop("WRITE-LINE")?;
        let (offset, len) = self.range_offset(addr, u, "WRITE-LINE")?;
        let mut bytes = self.memory[offset..offset + len].to_vec();
        bytes.push(b'\n');

        let ior = {
            let file = self.file_slot(id, "WRITE-LINE")?;
            match file.write_all(&bytes) {
                Ok(()) => 0,
                Err(e) => Self::ior_of(&e),
            }
        };
        self.push(ior, "WRITE-LINE")
    }
}
