use analysis::{
    AnalysisError,
    domains::{JoinSemiLattice, JoinSemiLatticeNoContext, Lattice},
};
use itertools::iproduct;

use super::{
    Analyses,
    test_utils::check_report,
    typestate::{FileEvent, FileProtocol, FileState},
};
use crate::{
    parser_tests::parse_string,
    session::{AnalysisSession, SessionConfig},
};

use FileEvent as E;
use FileState as S;

fn run_events(events: &[FileEvent]) -> FileState {
    events
        .iter()
        .fold(FileState::Init, |state, event| state.transition(*event))
}

#[test]
fn transitions() {
    assert_eq!(run_events(&[E::Open, E::Close]), S::Close);
    assert_eq!(run_events(&[E::Close]), S::Error);
    assert_eq!(run_events(&[E::Use]), S::Error);
    assert_eq!(run_events(&[E::Open, E::Use, E::Use]), S::Open);
    assert_eq!(run_events(&[E::Open, E::Open]), S::Error);
    assert_eq!(run_events(&[E::Open, E::Close, E::Close]), S::Error);
    assert_eq!(run_events(&[E::Open, E::Close, E::Open]), S::Open);
    for event in [E::Open, E::Close, E::Use] {
        assert_eq!(S::Error.transition(event), S::Error);
        assert_eq!(S::Bottom.transition(event), S::Bottom);
    }
}

#[test]
fn file_state_lattice() {
    let states = [S::Bottom, S::Init, S::Open, S::Close, S::Error];
    for (a, b) in iproduct!(states, states) {
        let join = a.join_(&b);
        assert!(join >= a && join >= b, "{a} {b}");
        assert_eq!(join, b.join_(&a));
        let meet = a.meet(&b, &());
        assert!(meet <= a && meet <= b, "{a} {b}");
    }
    assert_eq!(S::bottom(&()), S::Bottom);
    assert_eq!(S::Open.join_(&S::Close), S::Error);
    assert_eq!(S::Init.join_(&S::Open), S::Error);
    assert_eq!(S::Open.meet(&S::Close, &()), S::Bottom);
    assert_eq!(S::Open.partial_cmp(&S::Close), None);
}

#[test]
fn transitions_are_monotone() {
    let states = [S::Bottom, S::Init, S::Open, S::Close, S::Error];
    for (a, b, event) in iproduct!(states, states, [E::Open, E::Close, E::Use]) {
        if a <= b {
            assert!(
                a.transition(event) <= b.transition(event),
                "{a} <= {b} after {event:?}"
            );
        }
    }
}

#[test]
fn protocol_events() {
    let protocol = FileProtocol::default();
    assert_eq!(protocol.event("fopen"), Some(E::Open));
    assert_eq!(protocol.event("fclose"), Some(E::Close));
    assert_eq!(protocol.event("fprintf"), Some(E::Use));
    assert_eq!(protocol.event("printf"), None);
}

#[test]
fn paths_and_summary() {
    let source = r"declare @fopen(%name)
declare @fclose(%f)
declare @fgetc(%f)

define @main(%c) {
entry:
  %f = alloca
  %counter = alloca
  %h = call @fopen(1)
  store %h, %f
  store 0, %counter
  br %c, read, skip

read:
  %t = load %f
  %ch = call @fgetc(%t)
  %u = load %f
  call @fclose(%u)
  br done

skip:
  %v = load %f
  call @fclose(%v)
  call @fclose(%f)
  br done

done:
  ret
}
";
    let expected = r"@main
path: entry read done
  %f CLOSE
path: entry skip done
  %f ERROR
summary:
  %f ERROR
";
    check_report(Analyses::Typestate, source, expected);
}

#[test]
fn cyclic_functions_are_rejected() {
    let source = r"define @main() {
entry:
  br loop

loop:
  br loop
}
";
    let unit = parse_string(source).unwrap();
    let session = AnalysisSession::new(&unit, SessionConfig::default());
    assert_eq!(
        session.typestate().unwrap_err(),
        AnalysisError::CyclicCfg(1)
    );
}

#[test]
fn custom_protocol() {
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
    let unit = parse_string(source).unwrap();
    let config = SessionConfig {
        protocol: FileProtocol {
            open: vec!["connect".to_owned()],
            close: vec!["disconnect".to_owned()],
            uses: Vec::new(),
        },
        ..SessionConfig::default()
    };
    let results = AnalysisSession::new(&unit, config).typestate().unwrap();
    let db = unit.identifiers.lookup("db").unwrap();
    assert_eq!(results[0].summary.get(&db), Some(&S::Close));
    assert_eq!(results[0].paths.len(), 1);
}
