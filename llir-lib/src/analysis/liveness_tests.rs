use analysis::solvers::Approximation;

use super::{
    Analyses,
    liveness::{Granularity, LivenessResult},
    test_utils::check_report,
};
use crate::{
    ir::Unit,
    parser_tests::parse_string,
    session::{AnalysisSession, SessionConfig},
};

const GRANULARITIES: [Granularity; 3] = [
    Granularity::Block,
    Granularity::Branch,
    Granularity::Instruction,
];

fn liveness(unit: &Unit, granularity: Granularity, approximation: Approximation) -> LivenessResult {
    let config = SessionConfig {
        liveness_approximation: approximation,
        ..SessionConfig::default()
    };
    let session = AnalysisSession::new(unit, config);
    session.liveness(granularity).unwrap().remove(0)
}

#[test]
fn straight_line() {
    let source = r"define @main() {
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
    let unit = parse_string(source).unwrap();
    let expected = "line 5: {}\nline 6: {a }\nline 7: {}\nline 8: {b }\n";
    for granularity in GRANULARITIES {
        let result = liveness(&unit, granularity, Approximation::May);
        assert_eq!(result.render_lines(&unit), expected, "{granularity:?}");
    }

    check_report(
        Analyses::Liveness(Granularity::Instruction),
        source,
        &format!("@main: 5 steps\n{expected}"),
    );
}

const LOOP: &str = r"define @main() {
entry:
  %i = alloca !1
  %s = alloca !1
  store 0, %i !2
  store 0, %s !3
  br loop

loop:
  %t = load %i !4
  %c = icmp slt %t, 10
  br %c, body, done

body:
  %a = load %s !5
  %b = load %i !5
  %n = add %a, %b
  store %n, %s !6
  %m = add %b, 1
  store %m, %i !7
  br loop

done:
  %r = load %s !8
  ret %r
}
";

const LOOP_LINES: &str = r"line 2: {}
line 3: {i }
line 4: {i s }
line 5: {i s }
line 6: {}
line 7: {s }
line 8: {s }
";

#[test]
fn loop_liveness() {
    check_report(
        Analyses::Liveness(Granularity::Branch),
        LOOP,
        &format!("@main: 5 steps\n{LOOP_LINES}"),
    );

    let unit = parse_string(LOOP).unwrap();
    for granularity in GRANULARITIES {
        let result = liveness(&unit, granularity, Approximation::May);
        assert_eq!(result.render_lines(&unit), LOOP_LINES, "{granularity:?}");
    }
}

#[test]
fn block_granularity_follows_layout() {
    // The exit block is laid out before the loop body.
    let source = LOOP.replace(
        "done:\n  %r = load %s !8\n  ret %r\n",
        "",
    );
    let source = source.replace(
        "body:\n",
        "done:\n  %r = load %s !8\n  ret %r\n\nbody:\n",
    );
    let unit = parse_string(&source).unwrap();

    let precise = liveness(&unit, Granularity::Branch, Approximation::May);
    assert_eq!(precise.render_lines(&unit), LOOP_LINES);
    let precise = liveness(&unit, Granularity::Instruction, Approximation::May);
    assert_eq!(precise.render_lines(&unit), LOOP_LINES);

    let sweep = liveness(&unit, Granularity::Block, Approximation::May);
    let lines = sweep.render_lines(&unit);
    assert!(lines.ends_with("line 8: {i s }\n"), "{lines}");
    assert_eq!(sweep.processed, 4);
}

#[test]
fn must_liveness() {
    let source = r"define @main(%c) {
entry:
  %x = alloca !1
  %y = alloca !1
  store 1, %x !2
  store 2, %y !3
  br %c, left, right

left:
  %a = load %x !4
  ret %a

right:
  %b = load %y !5
  ret %b
}
";
    let unit = parse_string(source).unwrap();
    for granularity in [Granularity::Branch, Granularity::Instruction] {
        let may = liveness(&unit, granularity, Approximation::May);
        assert_eq!(
            may.render_lines(&unit),
            "line 2: {}\nline 3: {x }\nline 4: {x }\nline 5: {y }\n",
            "{granularity:?}"
        );
        let must = liveness(&unit, granularity, Approximation::Must);
        assert_eq!(
            must.render_lines(&unit),
            "line 2: {}\nline 3: {}\nline 4: {x }\nline 5: {y }\n",
            "{granularity:?}"
        );
    }
}

#[test]
fn node_limit() {
    let unit = parse_string(LOOP).unwrap();
    let config = SessionConfig {
        node_limit: 1,
        ..SessionConfig::default()
    };
    let session = AnalysisSession::new(&unit, config);
    assert!(session.liveness(Granularity::Branch).is_err());
    assert!(session.liveness(Granularity::Block).is_ok());
}

#[test]
fn report_from_computed_results() {
    let unit = parse_string(LOOP).unwrap();
    let session = AnalysisSession::new(&unit, SessionConfig::default());
    for granularity in GRANULARITIES {
        let results = session.liveness(granularity).unwrap();
        assert_eq!(
            session.liveness_report(&results),
            session.report(Analyses::Liveness(granularity)).unwrap(),
            "{granularity:?}"
        );
    }
}
