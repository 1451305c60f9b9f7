//! Integration tests for goban-analysis
//!
//! These drive the public API the way a board view would: navigate the record,
//! feed engine output through a session and look at the resulting overlay.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use assert_matches::assert_matches;

use goban_analysis::analysis::Overlay;
use goban_analysis::analyzer::{AnalyzerState, Session};
use goban_analysis::board::Color;
use goban_analysis::config::{AnalysisSettings, EngineConfig};
use goban_analysis::error::{AnalyzerError, GameError};
use goban_analysis::gametree::GameTree;
use goban_analysis::gtp::{EngineLine, EngineLink, ProcessLink};
use goban_analysis::numbering::MoveNumbers;
use goban_analysis::position::Position;
use goban_analysis::render::Diagram;

// =============================================================================
// Helpers
// =============================================================================

/// Engine link that only records what was sent.
#[derive(Clone, Default)]
struct ScriptedLink {
    sent: Rc<RefCell<Vec<String>>>,
}

impl ScriptedLink {
    fn commands_since(&self, from: usize) -> Vec<String> {
        self.sent.borrow()[from..]
            .iter()
            .map(|l| l.split_once(' ').map_or(l.clone(), |(_, c)| c.to_string()))
            .collect()
    }

    fn len(&self) -> usize {
        self.sent.borrow().len()
    }
}

impl EngineLink for ScriptedLink {
    fn send_line(&mut self, line: &str) -> Result<(), AnalyzerError> {
        self.sent.borrow_mut().push(line.to_string());
        Ok(())
    }

    fn close(&mut self) {}
}

/// Acknowledge every command sent since `from`, as a well-behaved engine would.
fn ack_from(link: &ScriptedLink, feed: &dyn Fn(EngineLine), from: usize) -> usize {
    let sent = link.sent.borrow().clone();
    for line in &sent[from..] {
        let id = line.split(' ').next().unwrap_or_default();
        feed(EngineLine::Line(format!("={id}")));
    }
    sent.len()
}

fn info(s: &str) -> EngineLine {
    EngineLine::Line(s.to_string())
}

/// A session on an empty board with a started, acknowledged engine.
fn running_session(size: usize) -> (Session<ScriptedLink>, ScriptedLink, impl Fn(EngineLine)) {
    let tree = GameTree::new(Position::new(size), Color::Black);
    let mut session = Session::new(tree, 7.5, AnalysisSettings::default()).unwrap();
    let link = ScriptedLink::default();
    let feed = session.new_connection();
    session.start_engine(link.clone()).unwrap();
    let acked = ack_from(&link, &feed, 0);
    session.pump();
    ack_from(&link, &feed, acked);
    session.pump();
    assert_eq!(session.analyzer().state(), AnalyzerState::Running);
    (session, link, feed)
}

fn snapshot(overlay: &Overlay, position: &Position) -> (Vec<f64>, Vec<u32>, String) {
    (
        overlay.winrate_deltas().to_vec(),
        overlay.visit_counts().to_vec(),
        Diagram::new(position).with_overlay(Some(overlay)).to_string(),
    )
}

// =============================================================================
// Record and numbering
// =============================================================================

#[test]
fn test_two_move_numbering_on_19x19() {
    let mut tree = GameTree::new(Position::new(19), Color::Black);
    let first = tree.add_child_move(tree.root(), 4, 4).unwrap();
    let second = tree.add_child_move(first, 15, 15).unwrap();
    assert_eq!(tree.node(second).unwrap().position().stone_at(15, 15), Some(Color::White));

    let numbers = MoveNumbers::history(&tree, second).unwrap();
    let pos = tree.node(second).unwrap().position();
    let (a, b) = (pos.bitpos(4, 4), pos.bitpos(15, 15));
    // Nearest move first during the walk...
    assert_eq!(numbers.raw(b), 1);
    assert_eq!(numbers.raw(a), 2);
    // ...then reversed for display: n_back - v + 1.
    assert_eq!(numbers.max_number(), 2);
    assert_eq!(numbers.displayed(a), Some(1));
    assert_eq!(numbers.displayed(b), Some(2));
}

#[test]
fn test_numbering_straight_line_and_boundary() {
    let size = 13;
    let mut tree = GameTree::new(Position::new(size), Color::Black);
    let points: Vec<(usize, usize)> = (0..10).map(|i| (i, (i * 3) % size)).collect();
    let mut ids = Vec::new();
    let mut cur = tree.root();
    for &(x, y) in &points {
        cur = tree.add_child_move(cur, x, y).unwrap();
        ids.push(cur);
    }

    let numbers = MoveNumbers::history(&tree, cur).unwrap();
    let mut shown: Vec<u32> = points
        .iter()
        .map(|&(x, y)| numbers.displayed(y * size + x).unwrap())
        .collect();
    assert_eq!(shown, (1..=10).collect::<Vec<_>>());
    shown.dedup();
    assert_eq!(shown.len(), 10);

    tree.set_start_count(ids[5], true).unwrap();
    let numbers = MoveNumbers::history(&tree, cur).unwrap();
    assert_eq!(numbers.max_number(), 4);
    for (i, &(x, y)) in points.iter().enumerate() {
        let expected = (i > 5).then(|| (i - 5) as u32);
        assert_eq!(numbers.displayed(y * size + x), expected, "move {i}");
    }
}

#[test]
fn test_oversized_board_is_clamped_end_to_end() {
    let (mut session, link, feed) = running_session(26);
    assert_eq!(session.tree().board_size(), 25);

    let from = link.len();
    session.play(24, 0).unwrap();
    session.pump();
    let sent = link.commands_since(from);
    assert_eq!(sent, vec!["clear_board", "play B Z25", "lz-analyze W 100"]);
    ack_from(&link, &feed, from);
    session.pump();
    assert_eq!(session.analyzer().state(), AnalyzerState::Running);

    let position = session.tree().node(session.tree().active()).unwrap().position();
    let text = Diagram::new(position).to_string();
    assert!(text.contains("25  . . . . . . . . . . . . . . . . . . . . . . . . X 25"));
    assert_matches!(session.play(25, 0), Err(GameError::InvalidMove(_)));
}

#[test]
fn test_illegal_move_leaves_record_unchanged() {
    let mut tree = GameTree::new(Position::new(9), Color::White);
    let mut setup = tree.node(tree.root()).unwrap().position().clone();
    setup.set_stone(1, 0, Some(Color::Black));
    setup.set_stone(0, 1, Some(Color::Black));
    tree.replace(tree.root(), setup, Color::White).unwrap();

    let len = tree.len();
    assert_matches!(
        tree.add_child_move(tree.root(), 0, 0),
        Err(GameError::InvalidMove(_))
    );
    assert_matches!(
        tree.add_child_move(tree.root(), 1, 0),
        Err(GameError::InvalidMove(_))
    );
    assert_eq!(tree.len(), len);
    assert!(tree.node(tree.root()).unwrap().children().is_empty());

    // Once (1, 0) is in atari the corner point captures instead.
    let a = tree.add_child_move(tree.root(), 2, 0).unwrap();
    let b = tree.add_child_move(a, 8, 8).unwrap();
    let c = tree.add_child_move(b, 1, 1).unwrap();
    let d = tree.add_child_move(c, 8, 7).unwrap();
    let e = tree.add_child_move(d, 0, 0).unwrap();
    let pos = tree.node(e).unwrap().position();
    assert_eq!(pos.stone_at(1, 0), None);
    assert_eq!(pos.stone_at(0, 1), Some(Color::Black));
    assert_eq!(pos.stone_at(0, 0), Some(Color::White));
}

#[test]
fn test_random_session_navigation() {
    let mut rng = fastrand::Rng::with_seed(2024);
    let tree = GameTree::new(Position::new(7), Color::Black);
    let mut session: Session<ScriptedLink> =
        Session::new(tree, 7.5, AnalysisSettings::default()).unwrap();

    for _ in 0..300 {
        match rng.u8(0..10) {
            0..=5 => {
                let _ = session.play(rng.usize(0..7), rng.usize(0..7));
            }
            6 => {
                session.pass().unwrap();
            }
            7 => {
                let active = session.tree().active();
                if let Some(parent) = session.tree().prev_move(active) {
                    session.navigate(parent).unwrap();
                }
            }
            _ => {
                if !session.tree().root_node_p(session.tree().active()) {
                    let parent = session.delete_active().unwrap();
                    assert_eq!(session.tree().active(), parent);
                }
            }
        }
        session.pump();

        let tree = session.tree();
        let path = tree.path_from_root(tree.active());
        assert_eq!(path.first(), Some(&tree.root()));
        assert_eq!(path.len(), tree.depth(tree.active()) + 1);
        for (depth, &id) in path.iter().enumerate() {
            assert_eq!(tree.depth(id), depth);
        }
        assert_eq!(tree.node(tree.active()).unwrap().observer_count(), 1);
    }
}

// =============================================================================
// Overlay construction
// =============================================================================

#[test]
fn test_second_candidate_delta() {
    let tree = GameTree::new(Position::new(19), Color::Black);
    let mut overlay = Overlay::new(19);
    overlay
        .build(
            &tree,
            tree.root(),
            "info move D4 visits 100 winrate 5000 prior 1000 order 0 pv D4 Q16 D16 \
             info move Q16 visits 40 winrate 6000 prior 900 order 1 pv Q16 D4",
            &AnalysisSettings::default(),
        )
        .unwrap();
    let q16 = overlay.candidate_at(15, 3).unwrap();
    assert!((q16.delta - 0.1).abs() < 1e-9);
    assert!((overlay.winrate_deltas()[3 * 19 + 15] - 0.1).abs() < 1e-9);
    assert_eq!(overlay.candidate_at(3, 15).unwrap().delta, 0.0);
}

#[test]
fn test_pruning_toggle() {
    let tree = GameTree::new(Position::new(19), Color::Black);
    let report = "info move D4 visits 100 winrate 5000 pv D4 Q16 \
                  info move R2 visits 1 winrate 2000 pv R2";
    let mut overlay = Overlay::new(19);

    overlay.build(&tree, tree.root(), report, &AnalysisSettings::default()).unwrap();
    assert!(overlay.candidate_at(16, 17).is_none());

    overlay
        .build(&tree, tree.root(), report, &AnalysisSettings::default().with_prune(false))
        .unwrap();
    assert_eq!(overlay.candidate_at(16, 17).unwrap().visits, 1);
}

#[test]
fn test_malformed_record_among_valid_ones() {
    let tree = GameTree::new(Position::new(19), Color::Black);
    let mut overlay = Overlay::new(19);
    overlay
        .build(
            &tree,
            tree.root(),
            "info move D4 visits 10 winrate 5000 pv D4 \
             info move Q16 visits ten winrate 4000 pv Q16 \
             info move C3 visits 8 winrate 4500 pv C3",
            &AnalysisSettings::default(),
        )
        .unwrap();
    assert_eq!(overlay.candidates().len(), 2);
    let c3 = overlay.candidate_at(2, 16).unwrap();
    assert_eq!(c3.index, 1);
}

// =============================================================================
// Analyzer lifecycle through a session
// =============================================================================

#[test]
fn test_start_then_failure_disconnects() {
    let tree = GameTree::new(Position::new(19), Color::Black);
    let mut session: Session<ScriptedLink> =
        Session::new(tree, 7.5, AnalysisSettings::default()).unwrap();
    let feed = session.new_connection();
    session.start_engine(ScriptedLink::default()).unwrap();
    assert_eq!(session.analyzer().state(), AnalyzerState::Starting);

    feed(info("=1"));
    feed(info("?2 komi not accepted"));
    let updates = session.pump();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].state, AnalyzerState::Disconnected);
    assert_matches!(&updates[0].error, Some(AnalyzerError::EngineFailure(m)) if m == "komi not accepted");
    assert_eq!(session.analyzer().state(), AnalyzerState::Disconnected);
    assert!(session.overlay().winrate_deltas().iter().all(|&w| w == 0.0));
    assert!(session.overlay().visit_counts().iter().all(|&v| v == 0));
}

#[test]
fn test_report_applied_while_running() {
    let (mut session, _, feed) = running_session(19);
    feed(info("info move D4 visits 12 winrate 5300 pv D4 Q16 info move Q16 visits 3 winrate 5100 pv Q16 D4"));
    session.pump();
    assert_eq!(session.overlay().builds(), 1);
    assert_eq!(session.overlay().candidates().len(), 2);
    assert_eq!(session.overlay().primary().unwrap().mv, "D4");
}

#[test]
fn test_stale_reports_leave_overlay_untouched() {
    let (mut session, link, feed) = running_session(19);
    feed(info("info move D4 visits 12 winrate 5300 pv D4 Q16"));
    session.pump();
    assert_eq!(session.overlay().builds(), 1);

    // Navigate; the engine has not acknowledged the new request yet, so output
    // still streaming belongs to the previous position.
    let sent = link.len();
    session.play(3, 15).unwrap();
    session.pump();
    assert_eq!(
        link.commands_since(sent),
        vec!["clear_board", "play B D4", "lz-analyze W 100"]
    );
    let active = session.tree().active();
    let position = session.tree().node(active).unwrap().position().clone();
    let before = snapshot(session.overlay(), &position);

    feed(info("info move Q16 visits 40 winrate 6100 pv Q16 Q4"));
    session.pump();
    assert_eq!(snapshot(session.overlay(), &position), before);
    assert_eq!(session.overlay().builds(), 1);

    // Once acknowledged, reports apply again.
    ack_from(&link, &feed, sent);
    feed(info("info move Q16 visits 40 winrate 4900 pv Q16"));
    session.pump();
    assert_eq!(session.overlay().builds(), 2);
    assert!(session.overlay().candidate_at(15, 3).is_some());
}

#[test]
fn test_stale_epoch_ignored_with_overlay_present() {
    use goban_analysis::gtp::EngineEvent;

    let (mut session, _, feed) = running_session(19);
    feed(info("info move D4 visits 12 winrate 5300 pv D4 Q16"));
    session.pump();

    let position = session.tree().node(session.tree().root()).unwrap().position().clone();
    let before = snapshot(session.overlay(), &position);
    let old = session.analyzer().epoch() - 1;
    let tree = GameTree::new(Position::new(19), Color::Black);
    let update = session.analyzer_mut().handle_engine_event(
        &tree,
        EngineEvent::Report {
            epoch: old,
            text: "info move K10 visits 99 winrate 9000 pv K10".to_string(),
        },
    );
    assert!(update.is_none());
    assert_eq!(snapshot(session.overlay(), &position), before);
}

#[test]
fn test_view_pause_keeps_last_overlay() {
    let (mut session, _, feed) = running_session(19);
    feed(info("info move D4 visits 12 winrate 5300 pv D4"));
    session.pump();
    session.analyzer_mut().overlay_mut().set_eval_input_paused(true);
    feed(info("info move Q16 visits 12 winrate 5300 pv Q16"));
    session.pump();
    assert!(session.overlay().candidate_at(3, 15).is_some());
    assert!(session.overlay().candidate_at(15, 3).is_none());

    session.analyzer_mut().overlay_mut().set_eval_input_paused(false);
    feed(info("info move Q16 visits 12 winrate 5300 pv Q16"));
    session.pump();
    assert!(session.overlay().candidate_at(15, 3).is_some());
}

#[test]
fn test_pause_resume_and_stop() {
    let (mut session, link, feed) = running_session(9);
    let sent = link.len();
    session.analyzer_mut().pause(true).unwrap();
    assert_eq!(session.analyzer().state(), AnalyzerState::Paused);

    // Navigation while paused reseeds without asking for analysis.
    session.play(4, 4).unwrap();
    session.pump();
    session.analyzer_mut().pause(false).unwrap();
    assert_eq!(
        link.commands_since(sent),
        vec!["name", "clear_board", "play B E5", "lz-analyze W 100"]
    );

    session.analyzer_mut().stop();
    assert_eq!(session.analyzer().state(), AnalyzerState::Disconnected);
    assert!(session.overlay().is_empty());
    assert_eq!(link.commands_since(link.len() - 1), vec!["quit"]);
}

#[cfg(unix)]
#[test]
fn test_process_engine_round_trip() {
    let script = r#"
while read id cmd rest; do
  case "$cmd" in
    lz-analyze)
      printf '=%s\n' "$id"
      echo "info move D4 visits 10 winrate 5500 prior 100 order 0 pv D4 Q16 info move Q16 visits 4 winrate 5000 prior 50 order 1 pv Q16"
      ;;
    quit) printf '=%s\n\n' "$id"; exit 0 ;;
    *) printf '=%s\n\n' "$id" ;;
  esac
done
"#;
    let config = EngineConfig::new("sh").with_args(vec!["-c".to_string(), script.to_string()]);
    let tree = GameTree::new(Position::new(19), Color::Black);
    let mut session: Session<ProcessLink> =
        Session::new(tree, 7.5, AnalysisSettings::default()).unwrap();
    session.play(16, 3).unwrap();
    session.launch(&config).unwrap();

    let updates = session.run_for(Duration::from_secs(10), |s| s.overlay().builds() >= 1);
    assert!(updates.iter().all(|u| u.error.is_none()));
    assert_eq!(session.analyzer().state(), AnalyzerState::Running);
    let d4 = session.overlay().candidate_at(3, 15).unwrap();
    assert_eq!(d4.visits, 10);
    assert!((session.overlay().candidate_at(15, 3).unwrap().delta + 0.05).abs() < 1e-9);

    session.analyzer_mut().stop();
    assert_eq!(session.analyzer().state(), AnalyzerState::Disconnected);
}
