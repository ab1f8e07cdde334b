use forge::errors::ForthError;
use forge::primitives::{SourceKind, FALSE, TRUE};
use forge::Forth;
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

#[derive(Clone, Default)]
struct Capture(Rc<RefCell<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn forth() -> Forth {
    Forth::new().unwrap()
}

fn run(forth: &mut Forth, line: &str) {
    forth.interpret_line(line).unwrap();
}

fn stack(forth: &Forth) -> Vec<i64> {
    forth.vm.data_stack.iter().copied().collect()
}

#[test]
fn test_decimal_numbers() {
    let mut forth = forth();
    run(&mut forth, "42 -17 0");
    assert_eq!(stack(&forth), vec![42, -17, 0]);
}

#[test]
fn test_numbers_in_hex_base() {
    let mut forth = forth();
    run(&mut forth, "hex ff FF -a decimal");
    assert_eq!(stack(&forth), vec![255, 255, -10]);
}

#[test]
fn test_base_reflects_switch() {
    let mut forth = forth();
    run(&mut forth, "hex base @ decimal base @");
    assert_eq!(stack(&forth), vec![16, 10]);
}

#[test]
fn test_binary_base() {
    let mut forth = forth();
    run(&mut forth, "2 base ! 1011 decimal");
    assert_eq!(stack(&forth), vec![11]);
}

#[test]
fn test_malformed_number_is_unknown_word() {
    let mut forth = forth();
    let e = forth.interpret_line("12x4").unwrap_err();
    assert_eq!(e, ForthError::UnknownWord("12x4".to_string()));
}

#[test]
fn test_bare_minus_is_unknown_word() {
    let mut forth = forth();
    assert!(matches!(
        forth.interpret_line("- -").unwrap_err(),
        ForthError::StackUnderflow(_)
    ));
    forth.reset_after_abort();
    // A minus with no digits is not a number.
    assert!(matches!(
        forth.interpret_line("5 4 3 2 1 -x").unwrap_err(),
        ForthError::UnknownWord(_)
    ));
}

#[test]
fn test_digits_outside_base_rejected() {
    let mut forth = forth();
    let e = forth.interpret_line("2 base ! 102").unwrap_err();
    assert_eq!(e, ForthError::UnknownWord("102".to_string()));
}

#[test]
fn test_number_wraps_modulo_cell() {
    let mut forth = forth();
    // 2^64 wraps to zero.
    run(&mut forth, "18446744073709551616");
    assert_eq!(stack(&forth), vec![0]);
}

#[test]
fn test_find_is_case_insensitive() {
    let mut forth = forth();
    run(&mut forth, ": bump 1 + ;");
    run(&mut forth, "1 BUMP 1 Bump");
    assert_eq!(stack(&forth), vec![2, 2]);
}

#[test]
fn test_hidden_toggles_visibility() {
    let mut forth = forth();
    run(&mut forth, ": secret 7 ;");
    run(&mut forth, "hidden");
    assert!(matches!(
        forth.interpret_line("secret").unwrap_err(),
        ForthError::UnknownWord(_)
    ));
    forth.reset_after_abort();
    run(&mut forth, "hidden");
    run(&mut forth, "secret");
    assert_eq!(stack(&forth), vec![7]);
}

#[test]
fn test_immediate_word_runs_while_compiling() {
    let mut forth = forth();
    run(&mut forth, ": mark 99 ; immediate");
    // MARK executes during compilation, leaving 99 on the stack now.
    run(&mut forth, ": quiet mark ;");
    assert_eq!(stack(&forth), vec![99]);
    forth.vm.data_stack.clear();
    run(&mut forth, "quiet");
    assert_eq!(stack(&forth), vec![]);
}

#[test]
fn test_postpone_compiles_immediate_word() {
    let mut forth = forth();
    run(&mut forth, ": endif postpone then ; immediate");
    run(&mut forth, ": pick-it if 1 else 2 endif ;");
    run(&mut forth, "0 pick-it 1 pick-it");
    assert_eq!(stack(&forth), vec![2, 1]);
}

#[test]
fn test_evaluate_from_rust() {
    let mut forth = forth();
    forth.vm.evaluate("3 4 +").unwrap();
    assert_eq!(stack(&forth), vec![7]);
}

#[test]
fn test_evaluate_word() {
    let mut forth = forth();
    run(&mut forth, ": calc s\" 6 7 *\" evaluate ;");
    run(&mut forth, "calc");
    assert_eq!(stack(&forth), vec![42]);
}

#[test]
fn test_evaluate_restores_source() {
    let mut forth = forth();
    // The words after EVALUATE still come from the original line.
    run(&mut forth, ": calc s\" 1 2 +\" evaluate ; calc 10 *");
    assert_eq!(stack(&forth), vec![30]);
}

#[test]
fn test_refill_is_false_for_string_sources() {
    let mut forth = forth();
    forth.vm.evaluate("refill").unwrap();
    assert_eq!(stack(&forth), vec![FALSE]);
}

#[test]
fn test_source_and_to_in() {
    let mut forth = forth();
    run(&mut forth, "source nip >in @");
    let values = stack(&forth);
    assert_eq!(values.len(), 2);
    // SOURCE reports the whole line; >IN has consumed up through "nip ".
    assert_eq!(values[0], "source nip >in @".len() as i64);
    assert!(values[1] > 0 && values[1] <= values[0]);
}

#[test]
fn test_backslash_comment_discards_rest_of_line() {
    let mut forth = forth();
    run(&mut forth, "1 \\ 2 3 4");
    assert_eq!(stack(&forth), vec![1]);
}

#[test]
fn test_state_transitions() {
    let mut forth = forth();
    assert!(!forth.is_compiling());
    run(&mut forth, ": half-open 1");
    assert!(forth.is_compiling());
    run(&mut forth, "2 + ;");
    assert!(!forth.is_compiling());

    // [ and ] switch state inside a definition.
    run(&mut forth, ": tricky [ 5 ] literal ;");
    run(&mut forth, "tricky");
    assert_eq!(stack(&forth), vec![5]);
}

#[test]
fn test_quit_signal() {
    let mut forth = forth();
    forth.vm.return_stack.push(1);
    assert_eq!(forth.interpret_line("quit").unwrap_err(), ForthError::Quit);
    assert!(forth.vm.return_stack.is_empty());
}

#[test]
fn test_bye_signal() {
    let mut forth = forth();
    assert_eq!(forth.interpret_line("bye").unwrap_err(), ForthError::Bye);
}

#[test]
fn test_words_lists_definitions() {
    let mut forth = forth();
    let capture = Capture::default();
    forth.vm.set_output(Box::new(capture.clone()));
    run(&mut forth, ": shiny 1 ;");
    run(&mut forth, "words");
    let listing = capture.contents();
    assert!(listing.contains("shiny"));
    assert!(listing.contains("DUP"));
    // Newest first.
    let shiny = listing.find("shiny").unwrap();
    let dup = listing.find("DUP").unwrap();
    assert!(shiny < dup);
}

#[test]
fn test_see_decompiles_colon_definition() {
    let mut forth = forth();
    let capture = Capture::default();
    forth.vm.set_output(Box::new(capture.clone()));
    run(&mut forth, ": sq dup * ;");
    run(&mut forth, "see sq");
    let listing = capture.contents();
    assert!(listing.contains(": sq"));
    assert!(listing.contains("DUP"));
    assert!(listing.contains("*"));
}

#[test]
fn test_see_shows_literals() {
    let mut forth = forth();
    let capture = Capture::default();
    forth.vm.set_output(Box::new(capture.clone()));
    run(&mut forth, ": seven 7 ;");
    run(&mut forth, "see seven");
    assert!(capture.contents().contains('7'));
}

#[test]
fn test_included_file() {
    let mut forth = forth();
    let path = std::env::temp_dir().join("forge_test_included.fth");
    std::fs::write(&path, ": from-file 11 22 + ;\nfrom-file\n").unwrap();

    run(
        &mut forth,
        &format!("s\" {}\" included", path.display()),
    );
    assert_eq!(stack(&forth), vec![33]);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_include_missing_file_is_io_error() {
    let mut forth = forth();
    let e = forth
        .interpret_line("s\" /no/such/forge/file.fth\" included")
        .unwrap_err();
    assert!(matches!(e, ForthError::Io(_)));
}

#[test]
fn test_file_words_round_trip() {
    let mut forth = forth();
    let path = std::env::temp_dir().join("forge_test_filewords.txt");
    let path = path.display().to_string();
    std::fs::remove_file(&path).ok();

    run(&mut forth, &format!("s\" {}\" w/o open-file", path));
    assert_eq!(forth.vm.data_stack.pop(), Some(0)); // ior
    run(&mut forth, "constant out-file");

    run(&mut forth, "s\" hello\" out-file write-line");
    assert_eq!(forth.vm.data_stack.pop(), Some(0));
    run(&mut forth, "out-file close-file");
    assert_eq!(forth.vm.data_stack.pop(), Some(0));

    run(&mut forth, &format!("s\" {}\" r/o open-file", path));
    assert_eq!(forth.vm.data_stack.pop(), Some(0));
    run(&mut forth, "constant in-file");

    // Read the line back into scratch data space.
    run(&mut forth, "here 64 in-file read-line");
    assert_eq!(forth.vm.data_stack.pop(), Some(0)); // ior
    assert_eq!(forth.vm.data_stack.pop(), Some(TRUE)); // line read
    assert_eq!(forth.vm.data_stack.pop(), Some(5)); // length

    // A second read hits end of file.
    run(&mut forth, "here 64 in-file read-line");
    assert_eq!(forth.vm.data_stack.pop(), Some(0));
    assert_eq!(forth.vm.data_stack.pop(), Some(FALSE));
    assert_eq!(forth.vm.data_stack.pop(), Some(0));

    run(&mut forth, "in-file close-file");
    assert_eq!(forth.vm.data_stack.pop(), Some(0));
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_set_source_drives_interpret() {
    let mut forth = forth();
    forth.vm.set_source(b"2 2 +", SourceKind::Text);
    forth.vm.interpret().unwrap();
    assert_eq!(stack(&forth), vec![4]);
}
