use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use super::DiagnosticEmitter;

/// A writer whose contents outlive the emitter owning it.
#[derive(Clone, Default)]
struct SharedWriter(Rc<RefCell<Vec<u8>>>);

impl SharedWriter {
    fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn buffered_output() {
    let mut diag = DiagnosticEmitter::log_to_buffer();
    diag.out("define");
    diag.out_ln(" @main");
    diag.err_ln("Error: unknown function 'f'.");
    assert_eq!(diag.out_buffer().unwrap(), "define @main\n");
    assert_eq!(diag.err_buffer().unwrap(), "Error: unknown function 'f'.\n");
}

#[test]
fn error_format() {
    let mut diag = DiagnosticEmitter::log_to_buffer();
    diag.error(1, "Unexpected token: '$'.");
    diag.report(4, "at '}'", "Block 'entry' must end with br or ret.");
    assert_eq!(
        diag.err_buffer().unwrap(),
        "[line 1] Error : Unexpected token: '$'.\n\
         [line 4] Error at '}': Block 'entry' must end with br or ret.\n"
    );
    assert_eq!(diag.out_buffer().unwrap(), "");
}

#[test]
fn streams_are_flushed_on_drop() {
    let out = SharedWriter::default();
    let err = SharedWriter::default();
    {
        let mut diag = DiagnosticEmitter::new(Box::new(out.clone()), Box::new(err.clone()));
        diag.out_ln("ret");
        diag.report(2, "at end of file", "Instruction expected.");
        assert_eq!(diag.out_buffer(), None);
        assert_eq!(diag.err_buffer(), None);
    }
    assert_eq!(out.contents(), "ret\n");
    assert_eq!(
        err.contents(),
        "[line 2] Error at end of file: Instruction expected.\n"
    );
}
