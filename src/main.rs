// main.rs - Forth REPL

use forge::{Forth, ForthError};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::env;
use std::process;

fn main() {
    println!("forge forth v{}", env!("CARGO_PKG_VERSION"));
    println!("Type WORDS for a word list, BYE to exit");
    println!();

    let mut forth = match Forth::new() {
        Ok(forth) => forth,
        Err(e) => {
            eprintln!("initialization failed: {}", e);
            process::exit(1);
        }
    };

    // Command-line arguments are source files, included in order.
    let args: Vec<String> = env::args().collect();
    for path in args.iter().skip(1) {
        match forth.include_file(path) {
            Ok(()) => {}
            Err(ForthError::Bye) => return,
            Err(e) => {
                eprintln!("{}: {}", path, e);
                forth.reset_after_abort();
            }
        }
    }

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            process::exit(1);
        }
    };
    let history_file = dirs::home_dir().map(|mut p| {
        p.push(".forge_history");
        p
    });
    if let Some(ref path) = history_file {
        let _ = rl.load_history(path);
    }

    loop {
        let prompt = if forth.is_compiling() { "... " } else { "" };
        match rl.readline(prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());

                match forth.interpret_line(&line) {
                    Ok(()) => {
                        if !forth.is_compiling() {
                            println!(" ok");
                        }
                    }
                    Err(ForthError::Bye) => {
                        println!();
                        break;
                    }
                    Err(ForthError::Quit) => continue,
                    Err(e) => {
                        if e.has_message() {
                            eprintln!("{}", e);
                        }
                        forth.reset_after_abort();
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                forth.reset_after_abort();
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("Error: {:?}", e);
                break;
            }
        }
    }

    if let Some(ref path) = history_file {
        let _ = rl.save_history(path);
    }
}
