//! Plain-text board diagrams and analysis summaries.

use std::fmt;

use crate::analysis::Overlay;
use crate::analyzer::AnalyzerState;
use crate::board::Color;
use crate::config::WinratePerspective;
use crate::constants::COLUMN_LETTERS;
use crate::numbering::MoveNumbers;
use crate::position::{Mark, Position, letter_for};

/// A position with optional move numbers and candidate letters.
///
/// Numbers are shown modulo 100 on the stones they label. Candidate letters
/// from the overlay go on empty cells; letter and number marks of the
/// position itself are shown where nothing else is.
pub struct Diagram<'a> {
    position: &'a Position,
    numbers: Option<&'a MoveNumbers>,
    overlay: Option<&'a Overlay>,
}

impl<'a> Diagram<'a> {
    pub fn new(position: &'a Position) -> Self {
        Self {
            position,
            numbers: None,
            overlay: None,
        }
    }

    pub fn with_numbers(mut self, numbers: Option<&'a MoveNumbers>) -> Self {
        self.numbers = numbers;
        self
    }

    pub fn with_overlay(mut self, overlay: Option<&'a Overlay>) -> Self {
        self.overlay = overlay;
        self
    }

    fn overlay_letter(&self, x: usize, y: usize) -> Option<char> {
        let tree = self.overlay?.tree()?;
        let root = tree.get(tree.root())?.position();
        (root.size() == self.position.size() && root.mark_at(x, y) == Mark::Letter)
            .then(|| letter_for(root.mark_extra_at(x, y)))
    }

    fn cell(&self, x: usize, y: usize) -> String {
        let pos = self.position;
        if let Some(stone) = pos.stone_at(x, y) {
            let number = self.numbers.and_then(|n| n.displayed(pos.bitpos(x, y)));
            return match (number, stone) {
                (Some(n), _) => format!("{:>2}", n % 100),
                (None, Color::Black) => " X".to_string(),
                (None, Color::White) => " O".to_string(),
            };
        }
        if let Some(letter) = self.overlay_letter(x, y) {
            return format!(" {letter}");
        }
        match pos.mark_at(x, y) {
            Mark::Letter => format!(" {}", letter_for(pos.mark_extra_at(x, y))),
            Mark::Number => format!("{:>2}", pos.mark_extra_at(x, y) % 100),
            _ => " .".to_string(),
        }
    }
}

impl fmt::Display for Diagram<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.position.size();
        write!(f, "   ")?;
        for x in 0..size {
            write!(f, " {}", COLUMN_LETTERS[x] as char)?;
        }
        writeln!(f)?;
        for y in 0..size {
            write!(f, "{:>2} ", size - y)?;
            for x in 0..size {
                write!(f, "{}", self.cell(x, y))?;
            }
            writeln!(f, " {}", size - y)?;
        }
        write!(f, "   ")?;
        for x in 0..size {
            write!(f, " {}", COLUMN_LETTERS[x] as char)?;
        }
        writeln!(f)
    }
}

/// One line per candidate: letter, move, winrate, change from the primary
/// and visits.
pub fn overlay_summary(overlay: &Overlay, perspective: WinratePerspective) -> String {
    let to_move = overlay.to_move().unwrap_or(Color::Black);
    let sign = match (perspective, to_move) {
        (WinratePerspective::Black, Color::White) | (WinratePerspective::White, Color::Black) => -1.0,
        _ => 1.0,
    };
    let mut out = String::new();
    for c in overlay.candidates() {
        out.push_str(&format!(
            "{} {:<4} {:5.1}% ({:+.1}) {:>7} visits\n",
            letter_for(c.index as u32),
            c.mv,
            perspective.display_winrate(c.winrate, to_move) * 100.0,
            sign * c.delta * 100.0,
            c.visits
        ));
    }
    out
}

/// Short status for the analyzer, e.g. `running: D4 51.2% (1200 visits)`.
pub fn status_line(state: AnalyzerState, overlay: &Overlay, perspective: WinratePerspective) -> String {
    let name = match state {
        AnalyzerState::Disconnected => "disconnected",
        AnalyzerState::Starting => "starting",
        AnalyzerState::Running => "running",
        AnalyzerState::Paused => "paused",
    };
    match (overlay.primary(), overlay.to_move()) {
        (Some(p), Some(to_move)) => format!(
            "{name}: {} {:.1}% ({} visits)",
            p.mv,
            perspective.display_winrate(p.winrate, to_move) * 100.0,
            p.visits
        ),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisSettings;
    use crate::gametree::GameTree;

    fn row(text: &str, rank: usize) -> String {
        let prefix = format!("{rank:>2} ");
        text.lines()
            .find(|l| l.starts_with(&prefix))
            .map(str::to_string)
            .unwrap_or_default()
    }

    #[test]
    fn test_empty_board_frame() {
        let pos = Position::new(5);
        let text = Diagram::new(&pos).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "    A B C D E");
        assert_eq!(lines[1], " 5  . . . . . 5");
        assert_eq!(lines[6], lines[0]);
    }

    #[test]
    fn test_oversized_board_frame() {
        let pos = Position::new(26);
        let text = Diagram::new(&pos).to_string();
        assert_eq!(text.lines().count(), 27);
        assert!(text.lines().next().unwrap().ends_with("Y Z"));
        assert!(text.contains("25  ."));
    }

    #[test]
    fn test_numbers_on_stones() {
        let mut tree = GameTree::new(Position::new(5), Color::Black);
        let a = tree.add_child_move(tree.root(), 0, 0).unwrap();
        let b = tree.add_child_move(a, 4, 4).unwrap();
        let numbers = MoveNumbers::history(&tree, b).unwrap();
        let pos = tree.node(b).unwrap().position();

        let plain = Diagram::new(pos).to_string();
        assert_eq!(row(&plain, 5), " 5  X . . . . 5");

        let text = Diagram::new(pos).with_numbers(Some(&numbers)).to_string();
        assert_eq!(row(&text, 5), " 5  1 . . . . 5");
        assert_eq!(row(&text, 1), " 1  . . . . 2 1");
    }

    #[test]
    fn test_overlay_letters_and_summary() {
        let tree = GameTree::new(Position::new(9), Color::White);
        let mut overlay = Overlay::new(9);
        overlay
            .build(
                &tree,
                tree.root(),
                "info move E5 visits 40 winrate 4000 pv E5 \
                 info move C3 visits 10 winrate 3500 pv C3 G7",
                &AnalysisSettings::default(),
            )
            .unwrap();
        let pos = tree.node(tree.root()).unwrap().position();
        let text = Diagram::new(pos).with_overlay(Some(&overlay)).to_string();
        assert_eq!(row(&text, 5), " 5  . . . . A . . . . 5");
        assert_eq!(row(&text, 3), " 3  . . B . . . . . . 3");

        let summary = overlay_summary(&overlay, WinratePerspective::ToMove);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("A E5"));
        assert!(lines[1].contains("(-5.0)"));

        // White to move, shown from Black's side.
        let black_view = overlay_summary(&overlay, WinratePerspective::Black);
        assert!(black_view.lines().next().unwrap().contains("60.0%"));
        assert!(black_view.lines().nth(1).unwrap().contains("(+5.0)"));

        assert_eq!(
            status_line(AnalyzerState::Running, &overlay, WinratePerspective::ToMove),
            "running: E5 40.0% (40 visits)"
        );
        assert_eq!(
            status_line(AnalyzerState::Paused, &Overlay::new(9), WinratePerspective::ToMove),
            "paused"
        );
    }

    #[test]
    fn test_variation_diagram_stops_at_max_depth() {
        let tree = GameTree::new(Position::new(9), Color::Black);
        let mut overlay = Overlay::new(9);
        overlay
            .build(
                &tree,
                tree.root(),
                "info move E5 visits 40 winrate 4000 pv E5 C3 G7",
                &AnalysisSettings::default(),
            )
            .unwrap();
        let settings = AnalysisSettings::default().with_max_depth(2);
        let end = overlay.variation_position(4, 4, &settings).unwrap();
        let numbers = overlay.variation_numbers(4, 4, &settings);
        let text = Diagram::new(end).with_numbers(numbers.as_ref()).to_string();
        assert_eq!(row(&text, 5), " 5  . . . . 1 . . . . 5");
        assert_eq!(row(&text, 3), " 3  . . 2 . . . . . . 3");
        assert_eq!(row(&text, 7), " 7  . . . . . . . . . 7");
    }
}
