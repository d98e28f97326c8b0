use crate::*;

fn run_driver(source: &str, opts: Opt) -> Option<String> {
    let mut diag = DiagnosticEmitter::log_to_buffer();
    process_source(source, &mut diag, &opts)?;
    Some(diag.out_buffer().unwrap() + &diag.err_buffer().unwrap())
}

fn parse_args(args: &[&str]) -> Opt {
    Opt::parse_from(["llir-driver"].iter().chain(args).chain(&["source"]))
}

const STRAIGHT_LINE: &str = r"define @main() {
entry:
  %a = alloca
  %b = alloca
  store 1, %a
  %t = load %a
  store %t, %b
  %u = load %b
  ret %u
}
";

#[test]
fn print_program() {
    let output = run_driver(STRAIGHT_LINE, Opt::default()).unwrap();
    assert_eq!(output, STRAIGHT_LINE);
}

#[test]
fn cfg_dump() {
    let source = r"define @main() {
entry:
  %x = alloca
  store 5, %x
  ret
}
";
    let expected = r#"digraph "@main" {
  Node_0[label="%x = alloca\nstore 5, %x\nret"]

}

"#;
    let opts = Opt {
        dump_cfg: true,
        ..Opt::default()
    };
    let output = run_driver(source, opts).unwrap();
    assert_eq!(output, expected);
}

#[test]
fn statistics() {
    let expected = r"@main
  parameters: 0
  blocks: 1 (0 in loops)
  variables: a, b
  opcodes: alloca 2, load 2, ret 1, store 2
";
    let output = run_driver(STRAIGHT_LINE, parse_args(&["--stats"])).unwrap();
    assert_eq!(output, expected);
}

#[test]
fn liveness() {
    let expected = "@main: 5 steps\nline 5: {}\nline 6: {a }\nline 7: {}\nline 8: {b }\n";
    let opts = parse_args(&["--analyze", "liveness-instruction"]);
    assert_eq!(opts.analyze, Some(CLIAnalyses::LivenessInstruction));
    let output = run_driver(STRAIGHT_LINE, opts).unwrap();
    assert_eq!(output, expected);
}

#[test]
fn liveness_output_file() {
    let path = std::env::temp_dir().join(format!("llir-liveness-{}.txt", std::process::id()));
    let path_str = path.to_str().unwrap();
    let opts = parse_args(&[
        "--analyze",
        "liveness-branch",
        "--liveness-output",
        path_str,
    ]);
    let output = run_driver(STRAIGHT_LINE, opts).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(written, "line 5: {}\nline 6: {a }\nline 7: {}\nline 8: {b }\n");
    // The printed report and the file come from the same results.
    let (header, lines) = output.split_once('\n').unwrap();
    assert!(header.starts_with("@main: ") && header.ends_with(" steps"));
    assert_eq!(lines, written);
}

const TWO_CALLS: &str = r"define @f(%p) {
entry:
  ret %p
}

define @main() {
entry:
  %a = call @f(3)
  %b = call @f(-2)
  ret
}
";

#[test]
fn context_sensitive_signs() {
    let expected = r"define @main() {
entry:
  %a = call @f(3) /* a: Positive */
  %b = call @f(-2) /* b: Negative */
  ret
}

@main() -> Bottom
";
    let opts = parse_args(&[
        "--analyze",
        "sign",
        "--context-sensitive",
        "--function",
        "@main",
    ]);
    let output = run_driver(TWO_CALLS, opts).unwrap();
    assert_eq!(output, expected);
}

#[test]
fn unknown_function() {
    let opts = parse_args(&["--analyze", "sign", "--function", "missing"]);
    assert_eq!(run_driver(TWO_CALLS, opts), None);
}

#[test]
fn custom_file_protocol() {
    let source = r"define @main() {
entry:
  %db = alloca
  %c = call @connect()
  store %c, %db
  %d = load %db
  call @disconnect(%d)
  ret
}
";
    let expected = r"@main
path: entry
  %db CLOSE
summary:
  %db CLOSE
";
    let opts = parse_args(&[
        "--analyze",
        "typestate",
        "--open-fn",
        "connect",
        "--close-fn",
        "disconnect",
    ]);
    let config = opts.session_config();
    assert_eq!(config.protocol.open, vec!["connect"]);
    assert!(config.protocol.uses.contains(&"fgetc".to_owned()));
    let output = run_driver(source, opts).unwrap();
    assert_eq!(output, expected);
}

#[test]
fn session_options() {
    let opts = parse_args(&["--must-liveness", "--node-limit", "3", "-vv"]);
    let config = opts.session_config();
    assert_eq!(config.node_limit, 3);
    assert_eq!(config.liveness_approximation, Approximation::Must);
    assert!(!config.context_sensitive);
    assert_eq!(opts.log_level(), LevelFilter::Debug);
    assert_eq!(parse_args(&[]).node_limit, 20);
}

#[test]
fn parse_error() {
    let output = run_driver("define @main( {\n}\n", Opt::default());
    assert_eq!(output, None);
}
