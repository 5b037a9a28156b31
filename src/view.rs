use crate::theory::note_for_pitch;
use crate::tracker::KeyStateTracker;
use itertools::Itertools;

const CELL: usize = 6;

fn cell(tracker: &KeyStateTracker, key: char) -> String {
  let note = tracker
    .pitch_for_key(key)
    .map(|pitch| note_for_pitch(pitch).to_string())
    .unwrap_or_default();
  let label = format!("{}:{}", key, note);
  if tracker.is_sounding(key) {
    format!("[{:<w$}]", label, w = CELL - 2)
  } else {
    format!(" {:<w$} ", label, w = CELL - 2)
  }
}

/// Top row first, each row shifted half a key further right than the one above.
pub fn render(tracker: &KeyStateTracker) -> String {
  let header = format!(
    "layout: {}  octave: {:+}",
    tracker.current_layout_label(),
    tracker.current_octave_offset()
  );
  let rows = tracker
    .grid()
    .rows()
    .rev()
    .enumerate()
    .map(|(depth, keys)| {
      let indent = " ".repeat(depth * CELL / 2);
      let cells = keys.iter().map(|&key| cell(tracker, key)).join(" ");
      format!("{}{}", indent, cells).trim_end().to_string()
    });
  std::iter::once(header).chain(rows).join("\n")
}

#[test]
fn test_render() {
  use crate::grid::KeyboardGrid;
  use crate::layout::Layout;
  use crate::tracker::Recorder;
  let grid = KeyboardGrid::from_rows_top_down(vec!["qw", "as"]).unwrap();
  let layout = Layout::Chromatic { base: 60 };
  let mut tracker = KeyStateTracker::new(&grid, &layout);
  tracker.on_key_down('a', &mut Recorder::default()).unwrap();
  assert_eq!(
    render(&tracker),
    [
      "layout: Chromatic  octave: +0",
      " q:F5   w:F#5",
      "   [a:C5]  s:C#5",
    ]
    .join("\n")
  );
}
