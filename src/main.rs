use clap::Parser;
use rustyline::error::ReadlineError;
use thiserror::Error;

use cellbox::cell::Cell;
use cellbox::list::Pair;
use cellbox::mutator::{Cfg, Mutator};
use cellbox::oref::{CastError, Fixnum, Gc, ORef};
use cellbox::verifier::{verify_heap, VerifyError};
use cellbox::write::{render, WIDTH};

#[derive(Parser)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
struct Args {
    #[arg(long, default_value_t = 1 << 20 /* 1 MiB */)]
    heap_size: usize,

    /// Verify objects on every barriered write
    #[arg(long)]
    debug: bool
}

const PROMPT: &'static str = "cellbox> ";
const HISTORY_FILENAME: &'static str = ".cellbox-history.txt";

const HELP: &'static str = "\
cell <v>        allocate a cell holding <v>
pair <v> <v>    allocate a pair
get $i          read the value of cell $i
set $i <v>      store <v> into cell $i
show $i         print the layout of object $i
verify          verify the whole heap
remembered      drain the remembered set
<v> is an integer or an object $i";

#[derive(Debug, Error)]
enum ReplError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("expected {0} operand(s)")]
    Arity(usize),

    #[error("bad operand: {0}")]
    BadOperand(String),

    #[error("no object ${0}")]
    UnknownObject(usize),

    #[error("out of memory")]
    OutOfMemory,

    #[error(transparent)]
    Cast(#[from] CastError),

    #[error(transparent)]
    Verify(#[from] VerifyError)
}

struct Shell {
    mt: Mutator,
    objects: Vec<Gc<()>>
}

impl Shell {
    fn object(&self, operand: &str) -> Result<Gc<()>, ReplError> {
        let i = operand.strip_prefix('$')
            .and_then(|i| i.parse::<usize>().ok())
            .ok_or_else(|| ReplError::BadOperand(operand.to_string()))?;
        self.objects.get(i).copied().ok_or(ReplError::UnknownObject(i))
    }

    fn value(&self, operand: &str) -> Result<ORef, ReplError> {
        if operand.starts_with('$') {
            self.object(operand).map(ORef::from)
        } else {
            operand.parse::<isize>().ok()
                .and_then(|n| Fixnum::try_from(n).ok())
                .map(ORef::from)
                .ok_or_else(|| ReplError::BadOperand(operand.to_string()))
        }
    }

    fn push(&mut self, obj: Gc<()>) -> String {
        self.objects.push(obj);
        format!("${} = {}", self.objects.len() - 1, obj)
    }

    fn eval(&mut self, line: &str) -> Result<String, ReplError> {
        let words = line.split_whitespace().collect::<Vec<_>>();
        let (command, operands) = match words.split_first() {
            Some((command, operands)) => (*command, operands),
            None => return Ok(String::new())
        };

        let arity = |n: usize| if operands.len() == n { Ok(()) } else { Err(ReplError::Arity(n)) };

        match command {
            "help" => Ok(HELP.to_string()),

            "cell" => {
                arity(1)?;
                let v = self.value(operands[0])?;
                let cell = Gc::<Cell>::new(&mut self.mt, v).ok_or(ReplError::OutOfMemory)?;
                Ok(self.push(cell.as_any()))
            },

            "pair" => {
                arity(2)?;
                let car = self.value(operands[0])?;
                let cdr = self.value(operands[1])?;
                let pair = Gc::<Pair>::new(&mut self.mt, car, cdr).ok_or(ReplError::OutOfMemory)?;
                Ok(self.push(pair.as_any()))
            },

            "get" => {
                arity(1)?;
                let cell = self.object(operands[0])?.try_cast::<Cell>()?;
                Ok(format!("{}", unsafe { cell.as_ref() }.value()))
            },

            "set" => {
                arity(2)?;
                let cell = self.object(operands[0])?.try_cast::<Cell>()?;
                let v = self.value(operands[1])?;
                unsafe { cell.as_ref() }.set_value(&mut self.mt, v);
                Ok(format!("{}", v))
            },

            "show" => {
                arity(1)?;
                let obj = self.object(operands[0])?;
                Ok(render(&obj.to_doc(), WIDTH))
            },

            "verify" => {
                arity(0)?;
                verify_heap(&self.mt)?;
                Ok(format!("ok: {} objects, {} bytes", self.mt.objects().count(), self.mt.heap().used()))
            },

            "remembered" => {
                arity(0)?;
                let hosts = self.mt.take_remembered();
                Ok(hosts.iter().map(|host| format!("{}", host)).collect::<Vec<_>>().join("\n"))
            },

            _ => Err(ReplError::UnknownCommand(command.to_string()))
        }
    }
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    let mt = match Mutator::new(Cfg { heap_size: args.heap_size, debug: args.debug }) {
        Some(mt) => mt,
        None => {
            eprintln!("Error: could not create a heap of {} bytes", args.heap_size);
            return;
        }
    };
    let mut shell = Shell { mt, objects: Vec::new() };

    let mut rl = match rustyline::Editor::<()>::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            return;
        }
    };

    if rl.load_history(HISTORY_FILENAME).is_err() {
        println!("No previous history.");
    }

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                rl.add_history_entry(line.as_str());

                match shell.eval(line.as_str()) {
                    Ok(output) => if !output.is_empty() { println!("{}", output); },
                    Err(err) => println!("Error: {}", err)
                }
            },
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            },
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            },
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Err(err) = rl.save_history(HISTORY_FILENAME) {
        eprintln!("Error: {:?}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> Shell {
        Shell { mt: Mutator::new(Cfg::default()).unwrap(), objects: Vec::new() }
    }

    #[test]
    fn set_and_get() {
        let mut sh = shell();
        assert!(sh.eval("cell 1").unwrap().starts_with("$0 = #<cell @ "));
        assert_eq!(sh.eval("get $0").unwrap(), "1");
        sh.eval("set $0 -7").unwrap();
        assert_eq!(sh.eval("get $0").unwrap(), "-7");
    }

    #[test]
    fn remembered_after_pointer_store() {
        let mut sh = shell();
        sh.eval("cell 0").unwrap();
        sh.eval("cell 0").unwrap();
        sh.eval("set $0 $1").unwrap();
        assert_eq!(sh.eval("remembered").unwrap(), format!("{}", sh.objects[0]));
        assert_eq!(sh.eval("remembered").unwrap(), "");
        assert!(sh.eval("verify").unwrap().starts_with("ok: 2 objects"));
    }

    #[test]
    fn errors() {
        let mut sh = shell();
        sh.eval("pair 1 2").unwrap();
        assert!(matches!(sh.eval("get $0"), Err(ReplError::Cast(_))));
        assert!(matches!(sh.eval("get $5"), Err(ReplError::UnknownObject(5))));
        assert!(matches!(sh.eval("set $0"), Err(ReplError::Arity(2))));
        assert!(matches!(sh.eval("cell x"), Err(ReplError::BadOperand(_))));
        assert!(matches!(sh.eval("frob"), Err(ReplError::UnknownCommand(_))));
    }
}
