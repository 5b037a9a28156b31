use crate::grid::{KeyboardGrid, Position};
use crate::theory::{pitch_for_note, NoteError, Pitch};

/// Rows top first, as they sit on the keyboard.
const SCALE: [&[&str]; 4] = [
  &[
    "b4", "c#5", "d#5", "f5", "f#5", "f#5", "f#5", "g#5", "a#5", "c6", "c#6", "d#6",
  ],
  &[
    "c5", "d5", "e5", "f5", "g5", "f5", "g5", "a5", "b5", "c6", "d6", "e6",
  ],
  &[
    "b3", "c#4", "d#4", "f4", "f#4", "f#4", "f#4", "g#4", "a#4", "c5", "c#5",
  ],
  &["c4", "d4", "e4", "f4", "g4", "f4", "g4", "a4", "b4", "c5"],
];

const PENTATONIC: [&[&str]; 4] = [
  &[
    "e6", "g6", "a6", "c7", "d7", "e7", "g7", "a7", "c8", "d8", "e8", "g8", "a8",
  ],
  &[
    "g5", "a5", "c6", "d6", "e6", "g6", "a6", "c7", "d7", "e7", "g7", "a7",
  ],
  &[
    "a4", "c5", "d5", "e5", "g5", "a5", "c6", "d6", "e6", "g6", "a6",
  ],
  &["c4", "d4", "e4", "g4", "a4", "c5", "d5", "e5", "g5", "a5"],
];

pub const DEFAULT_BASE: Pitch = 48;

/// Explicit pitch per key position, parsed from note names up front.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NoteTable(Vec<Vec<Option<Pitch>>>);

impl NoteTable {
  /// A cell spelled `-` is intentionally silent.
  pub fn parse(rows_top_down: &[&[&str]]) -> Result<Self, NoteError> {
    let rows = rows_top_down
      .iter()
      .rev()
      .map(|row| {
        row
          .iter()
          .map(|&cell| match cell {
            "-" => Ok(None),
            name => pitch_for_note(name).map(Some),
          })
          .collect::<Result<Vec<_>, _>>()
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self(rows))
  }
  pub fn get(&self, pos: Position) -> Option<Pitch> {
    self.0.get(pos.row)?.get(pos.col).copied().flatten()
  }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum LayoutKind {
  Chromatic,
  Scale,
  WholeTone,
  Pentatonic,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Layout {
  /// Semitone per column, fourth per row.
  Chromatic { base: Pitch },
  /// Whole tone per column, fourth per row.
  WholeTone { base: Pitch },
  ScaleDegree(NoteTable),
  Pentatonic(NoteTable),
}

impl Layout {
  pub fn kind(&self) -> LayoutKind {
    match self {
      Self::Chromatic { .. } => LayoutKind::Chromatic,
      Self::WholeTone { .. } => LayoutKind::WholeTone,
      Self::ScaleDegree(_) => LayoutKind::Scale,
      Self::Pentatonic(_) => LayoutKind::Pentatonic,
    }
  }
  pub fn label(&self) -> &'static str {
    match self {
      Self::Chromatic { .. } => "Chromatic",
      Self::WholeTone { .. } => "Whole Tone",
      Self::ScaleDegree(_) => "Scale",
      Self::Pentatonic(_) => "Pentatonic",
    }
  }
  pub fn pitch_at(&self, pos: Position) -> Option<Pitch> {
    let row = pos.row as Pitch;
    let col = pos.col as Pitch;
    match self {
      Self::Chromatic { base } => base.checked_add(row * 5 + col),
      Self::WholeTone { base } => base.checked_add(row * 5 + col * 2),
      Self::ScaleDegree(table) | Self::Pentatonic(table) => table.get(pos),
    }
  }
  /// Untransposed; the caller adds the octave offset.
  pub fn pitch_for_key(&self, grid: &KeyboardGrid, key: char) -> Option<Pitch> {
    self.pitch_at(grid.lookup(key)?)
  }
}

impl std::fmt::Display for Layout {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    f.write_str(self.label())
  }
}

/// Every layout, built once at startup.
#[derive(Clone, Debug)]
pub struct Layouts(Vec<Layout>);

impl Layouts {
  pub fn new(base: Pitch) -> Result<Self, NoteError> {
    Ok(Self(vec![
      Layout::Chromatic { base },
      Layout::ScaleDegree(NoteTable::parse(&SCALE)?),
      Layout::WholeTone { base },
      Layout::Pentatonic(NoteTable::parse(&PENTATONIC)?),
    ]))
  }
  pub fn get(&self, kind: LayoutKind) -> &Layout {
    // Every kind is present by construction.
    match self.0.iter().find(|layout| layout.kind() == kind) {
      Some(layout) => layout,
      None => unreachable!(),
    }
  }
}

#[cfg(test)]
fn qwerty() -> KeyboardGrid {
  KeyboardGrid::new(crate::grid::GridKind::Qwerty).unwrap()
}

#[test]
fn test_chromatic() {
  let layout = Layout::Chromatic { base: 48 };
  assert_eq!(layout.pitch_at(Position::new(0, 0)), Some(48));
  assert_eq!(layout.pitch_at(Position::new(0, 1)), Some(49));
  assert_eq!(layout.pitch_at(Position::new(1, 0)), Some(53));
  assert_eq!(layout.pitch_at(Position::new(3, 11)), Some(74));
  let grid = qwerty();
  assert_eq!(layout.pitch_for_key(&grid, 'z'), Some(48));
  assert_eq!(layout.pitch_for_key(&grid, 'a'), Some(53));
  assert_eq!(layout.pitch_for_key(&grid, '`'), None);
}

#[test]
fn test_whole_tone() {
  let layout = Layout::WholeTone { base: 30 };
  assert_eq!(layout.pitch_at(Position::new(0, 0)), Some(30));
  assert_eq!(layout.pitch_at(Position::new(0, 2)), Some(34));
  assert_eq!(layout.pitch_at(Position::new(2, 1)), Some(42));
  let layout = Layout::WholeTone { base: Pitch::MAX };
  assert_eq!(layout.pitch_at(Position::new(0, 0)), Some(Pitch::MAX));
  assert_eq!(layout.pitch_at(Position::new(0, 1)), None);
}

#[test]
fn test_scale() {
  let layouts = Layouts::new(DEFAULT_BASE).unwrap();
  let layout = layouts.get(LayoutKind::Scale);
  let grid = qwerty();
  // Bottom row: c4 d4 e4 f4 g4 f4 g4 ...
  assert_eq!(layout.pitch_for_key(&grid, 'z'), Some(48));
  assert_eq!(layout.pitch_for_key(&grid, 'x'), Some(50));
  // Adjacent keys may share a pitch.
  assert_eq!(layout.pitch_for_key(&grid, 'b'), Some(55));
  assert_eq!(layout.pitch_for_key(&grid, 'm'), Some(55));
  assert_eq!(layout.pitch_for_key(&grid, 'a'), Some(47));
  assert_eq!(layout.pitch_for_key(&grid, 's'), Some(49));
  assert_eq!(layout.pitch_for_key(&grid, '='), Some(75));
  assert_eq!(layout.pitch_for_key(&grid, '~'), None);
}

#[test]
fn test_pentatonic() {
  let layouts = Layouts::new(DEFAULT_BASE).unwrap();
  let layout = layouts.get(LayoutKind::Pentatonic);
  let grid = qwerty();
  assert_eq!(layout.pitch_for_key(&grid, 'z'), Some(48));
  assert_eq!(layout.pitch_for_key(&grid, 'v'), Some(55));
  assert_eq!(layout.pitch_for_key(&grid, 'a'), Some(57));
  assert_eq!(layout.pitch_for_key(&grid, '1'), Some(76));
  // The thirteenth cell of the top row has no key.
  assert_eq!(layout.pitch_at(Position::new(3, 12)), Some(105));
  assert_eq!(layout.pitch_at(Position::new(0, 10)), None);
  assert_eq!(layout.pitch_at(Position::new(4, 0)), None);
}

#[test]
fn test_note_table() {
  let table = NoteTable::parse(&[&["c5", "-"][..], &["c4", "d4", "e4"][..]]).unwrap();
  assert_eq!(table.get(Position::new(0, 2)), Some(52));
  assert_eq!(table.get(Position::new(1, 0)), Some(60));
  assert_eq!(table.get(Position::new(1, 1)), None);
  assert_eq!(table.get(Position::new(1, 2)), None);
  assert_eq!(
    NoteTable::parse(&[&["c4", "eb4"][..]]),
    Err(NoteError::Unrecognized("eb4".to_string()))
  );
}

#[test]
fn test_layouts() {
  use clap::ValueEnum;
  let layouts = Layouts::new(60).unwrap();
  let labels: Vec<_> = LayoutKind::value_variants()
    .iter()
    .map(|&kind| layouts.get(kind).label())
    .collect();
  assert_eq!(labels, vec!["Chromatic", "Scale", "Whole Tone", "Pentatonic"]);
  assert_eq!(
    layouts.get(LayoutKind::WholeTone),
    &Layout::WholeTone { base: 60 }
  );
  assert_eq!(layouts.get(LayoutKind::Chromatic).to_string(), "Chromatic");
}
