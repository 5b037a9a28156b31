use fnv::FnvHashMap;
use thiserror::Error;

/// Row 0 is the bottom row of the keyboard.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Position {
  pub row: usize,
  pub col: usize,
}

impl Position {
  pub fn new(row: usize, col: usize) -> Self {
    Self { row, col }
  }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum GridError {
  #[error("key {0:?} appears more than once")]
  DuplicateKey(char),
  #[error("keyboard has no keys")]
  Empty,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum GridKind {
  Qwerty,
  Dvorak,
}

const QWERTY: [&str; 4] = ["1234567890-=", "qwertyuiop[]", "asdfghjkl;'", "zxcvbnm,./"];
const DVORAK: [&str; 4] = ["1234567890[]", "',.pyfgcrl/=", "aoeuidhtns-", ";qjkxbmwvz"];

#[derive(Clone, Debug)]
pub struct KeyboardGrid {
  rows: Vec<Vec<char>>,
  positions: FnvHashMap<char, Position>,
}

impl KeyboardGrid {
  /// Rows are given top row first, the way they appear on the keyboard.
  pub fn from_rows_top_down<'r, I>(rows: I) -> Result<Self, GridError>
  where
    I: IntoIterator<Item = &'r str>,
    I::IntoIter: DoubleEndedIterator,
  {
    let rows: Vec<Vec<char>> = rows
      .into_iter()
      .rev()
      .map(|row| row.chars().map(|c| c.to_ascii_lowercase()).collect())
      .collect();
    let mut positions = FnvHashMap::default();
    for (r, row) in rows.iter().enumerate() {
      for (c, &key) in row.iter().enumerate() {
        if positions.insert(key, Position::new(r, c)).is_some() {
          return Err(GridError::DuplicateKey(key));
        }
      }
    }
    if positions.is_empty() {
      return Err(GridError::Empty);
    }
    Ok(Self { rows, positions })
  }
  pub fn new(kind: GridKind) -> Result<Self, GridError> {
    match kind {
      GridKind::Qwerty => Self::from_rows_top_down(QWERTY.iter().copied()),
      GridKind::Dvorak => Self::from_rows_top_down(DVORAK.iter().copied()),
    }
  }
  pub fn lookup(&self, key: char) -> Option<Position> {
    self.positions.get(&key.to_ascii_lowercase()).copied()
  }
  /// Bottom row first.
  pub fn rows(&self) -> impl DoubleEndedIterator<Item = &[char]> {
    self.rows.iter().map(Vec::as_slice)
  }
}

#[test]
fn test_lookup() {
  let grid = KeyboardGrid::new(GridKind::Qwerty).unwrap();
  assert_eq!(grid.rows().count(), 4);
  assert_eq!(grid.lookup('z'), Some(Position::new(0, 0)));
  assert_eq!(grid.lookup('x'), Some(Position::new(0, 1)));
  assert_eq!(grid.lookup('a'), Some(Position::new(1, 0)));
  assert_eq!(grid.lookup('A'), Some(Position::new(1, 0)));
  assert_eq!(grid.lookup('\''), Some(Position::new(1, 10)));
  assert_eq!(grid.lookup('='), Some(Position::new(3, 11)));
  assert_eq!(grid.lookup(' '), None);
  assert_eq!(grid.lookup('\\'), None);

  let grid = KeyboardGrid::new(GridKind::Dvorak).unwrap();
  assert_eq!(grid.lookup(';'), Some(Position::new(0, 0)));
  assert_eq!(grid.lookup('a'), Some(Position::new(1, 0)));
  assert_eq!(grid.lookup('-'), Some(Position::new(1, 10)));
  assert_eq!(grid.lookup('/'), Some(Position::new(2, 10)));
  assert_eq!(grid.lookup('1'), Some(Position::new(3, 0)));
}

#[test]
fn test_rows_are_bottom_up() {
  let grid = KeyboardGrid::from_rows_top_down(vec!["ab", "cd"]).unwrap();
  let rows: Vec<&[char]> = grid.rows().collect();
  assert_eq!(rows, vec![&['c', 'd'][..], &['a', 'b'][..]]);
}

#[test]
fn test_invalid_grids() {
  assert_eq!(
    KeyboardGrid::from_rows_top_down(vec!["abc", "dBe"]).unwrap_err(),
    GridError::DuplicateKey('b')
  );
  assert_eq!(
    KeyboardGrid::from_rows_top_down(vec!["", ""]).unwrap_err(),
    GridError::Empty
  );
}
