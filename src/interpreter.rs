// interpreter.rs - Threaded-code inner interpreter

use crate::dictionary::{Code, Xt};
use crate::errors::ForthError;
use crate::outer::signed_in_base;
use crate::primitives::{Cell, VM, CELL_SIZE, DATA_START};

impl VM {
    /// Execute one word. The entry itself is the dispatch context, so
    /// create/does runtimes know whose parameter field to push without any
    /// executing-word global.
    pub fn execute_xt(&mut self, xt: Xt) -> Result<(), ForthError> {
        let word = self
            .dictionary
            .get(xt)
            .ok_or(ForthError::InvalidAddress("EXECUTE"))?;
        let (code, parameter, does) = (word.code, word.parameter, word.does);

        match code {
            Code::Primitive(prim) => self.execute_primitive(prim),
            Code::Colon => self.run_thread(does),
            Code::Create => self.push(parameter as Cell, "EXECUTE"),
            Code::Does => {
                self.push(parameter as Cell, "EXECUTE")?;
                self.run_thread(does)
            }
        }
    }

    /// One colon frame: save IP on the return stack, walk the thread cell
    /// by cell, and stop on the EXIT sentinel. The sentinel terminates the
    /// frame without being executed, which is what lets user code juggle
    /// the saved IP with R> and >R.
    pub(crate) fn run_thread(&mut self, start: usize) -> Result<(), ForthError> {
        self.rpush(self.ip as Cell, "(colon)")?;
        self.ip = start;

        loop {
            let at = self.ip;
            if at < DATA_START || at % CELL_SIZE != 0 || at + CELL_SIZE > self.memory.len() {
                return Err(ForthError::InvalidAddress("(colon)"));
            }
            let cell = self.cell_at(at);
            self.ip = at + CELL_SIZE;

            if cell == self.exit_xt as Cell {
                break;
            }
            let xt = self.xt_from_cell(cell, "(colon)")?;
            self.execute_xt(xt)?;
        }

        let saved = self.rpop("(colon)")?;
        self.ip = saved.max(0) as usize;
        Ok(())
    }

    pub(crate) fn xt_from_cell(&self, cell: Cell, who: &'static str) -> Result<Xt, ForthError> {
        if cell < 0 || cell as usize >= self.dictionary.len() {
            return Err(ForthError::InvalidAddress(who));
        }
        Ok(cell as usize)
    }

    /// Read the operand cell at IP and step over it. Aborts when no thread
    /// is running, so operand primitives trap interpret-state misuse.
    fn thread_fetch(&mut self, who: &'static str) -> Result<Cell, ForthError> {
        let at = self.ip;
        if at < DATA_START || at % CELL_SIZE != 0 || at + CELL_SIZE > self.memory.len() {
            return Err(ForthError::InvalidAddress(who));
        }
        let x = self.cell_at(at);
        self.ip = at + CELL_SIZE;
        Ok(x)
    }

    /// Shared by (branch) and the zero case of (zbranch): the offset is
    /// measured in bytes from the offset cell's own address.
    fn take_branch(&mut self, who: &'static str) -> Result<(), ForthError> {
        let at = self.ip;
        if at < DATA_START || at % CELL_SIZE != 0 || at + CELL_SIZE > self.memory.len() {
            return Err(ForthError::InvalidAddress(who));
        }
        let offset = self.cell_at(at);
        if offset % CELL_SIZE as Cell != 0 {
            return Err(ForthError::InvalidAddress(who));
        }
        let target = at as i64 + offset;
        if target < DATA_START as i64 || target + CELL_SIZE as i64 > self.memory.len() as i64 {
            return Err(ForthError::InvalidAddress(who));
        }
        self.ip = target as usize;
        Ok(())
    }

    pub(crate) fn op_execute(&mut self) -> Result<(), ForthError> {
        let cell = self.pop("EXECUTE")?;
        let xt = self.xt_from_cell(cell, "EXECUTE")?;
        self.execute_xt(xt)
    }

    /// Inside a frame the sentinel is recognized before execution, so this
    /// body only ever runs when EXIT is used outside a colon definition.
    pub(crate) fn op_exit(&mut self) -> Result<(), ForthError> {
        Err(ForthError::Abort(Some(
            "EXIT: outside colon definition".to_string(),
        )))
    }

    pub(crate) fn op_lit(&mut self) -> Result<(), ForthError> {
        let x = self.thread_fetch("(lit)")?;
        self.push(x, "(lit)")
    }

    pub(crate) fn op_branch(&mut self) -> Result<(), ForthError> {
        self.take_branch("(branch)")
    }

    pub(crate) fn op_zbranch(&mut self) -> Result<(), ForthError> {
        let flag = self.pop("(zbranch)")?;
        if flag == 0 {
            self.take_branch("(zbranch)")
        } else {
            self.thread_fetch("(zbranch)").map(|_| ())
        }
    }

    /// Runtime of DOES>: repoint the latest definition so its future
    /// invocations push the parameter field and run the code that follows
    /// the marker. IP sits on the EXIT compiled after (does); the new
    /// behavior starts one cell past it.
    pub(crate) fn op_does_marker(&mut self) -> Result<(), ForthError> {
        if self.ip < DATA_START {
            return Err(ForthError::Abort(Some(
                "(does): outside colon definition".to_string(),
            )));
        }
        let does = self.ip + CELL_SIZE;
        match self.dictionary.latest_mut() {
            Some(word) => {
                word.code = Code::Does;
                word.does = does;
                Ok(())
            }
            None => Err(ForthError::InvalidAddress("(does)")),
        }
    }

    pub(crate) fn op_semis(&mut self) -> Result<(), ForthError> {
        Err(ForthError::Abort(Some("(;): not executable".to_string())))
    }

    /// SEE: decompile a definition. Colon and does bodies are walked up to
    /// the (;) marker; literals and branch offsets print inline.
    pub(crate) fn op_see(&mut self) -> Result<(), ForthError> {
        let name = self.parse_name("SEE")?;
        let xt = self
            .dictionary
            .find(name.as_bytes())
            .ok_or(ForthError::UnknownWord(name))?;
        let word = self
            .dictionary
            .get(xt)
            .ok_or(ForthError::InvalidAddress("SEE"))?;

        let text = match word.code {
            Code::Primitive(_) => format!("{} is a primitive\n", word.name),
            Code::Create => format!("create {}\n", word.name),
            Code::Colon => {
                format!(": {} {};\n", word.name, self.render_thread(word.does))
            }
            Code::Does => {
                format!(
                    "create {} does> {};\n",
                    word.name,
                    self.render_thread(word.does)
                )
            }
        };
        self.print_str(&text)
    }

    fn render_thread(&self, start: usize) -> String {
        let base = self.output_base();
        let mut text = String::new();
        let mut at = start;

        while at + CELL_SIZE <= self.here {
            let cell = self.cell_at(at);
            at += CELL_SIZE;

            if cell == self.semis_xt as Cell {
                break;
            }
            if cell == self.exit_xt as Cell {
                if at + CELL_SIZE <= self.here && self.cell_at(at) == self.semis_xt as Cell {
                    break;
                }
                text.push_str("exit ");
                continue;
            }
            if cell == self.lit_xt as Cell {
                let value = self.cell_at(at);
                at += CELL_SIZE;
                text.push_str(&signed_in_base(value, base));
                text.push(' ');
                continue;
            }
            if cell == self.branch_xt as Cell || cell == self.zbranch_xt as Cell {
                let offset = self.cell_at(at);
                at += CELL_SIZE;
                let name = if cell == self.branch_xt as Cell {
                    "(branch)"
                } else {
                    "(zbranch)"
                };
                text.push_str(&format!("{} {} ", name, signed_in_base(offset, base)));
                continue;
            }
            match self.dictionary.get(cell.max(0) as usize) {
                Some(w) if cell >= 0 => {
                    if w.name.is_empty() {
                        text.push_str("(noname) ");
                    } else {
                        text.push_str(&w.name);
                        text.push(' ');
                    }
                }
                _ => {
                    text.push_str(&signed_in_base(cell, base));
                    text.push(' ');
                }
            }
        }
        text
    }
}
