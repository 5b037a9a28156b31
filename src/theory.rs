use std::str::FromStr;
use thiserror::Error;

/// One semitone per unit; `octave * 12 + pitch class`.
pub type Pitch = i32;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PitchClass {
  C,
  CSharp,
  D,
  DSharp,
  E,
  F,
  FSharp,
  G,
  GSharp,
  A,
  ASharp,
  B,
}

impl PitchClass {
  pub fn ordinal(self) -> Pitch {
    match self {
      Self::C => 0,
      Self::CSharp => 1,
      Self::D => 2,
      Self::DSharp => 3,
      Self::E => 4,
      Self::F => 5,
      Self::FSharp => 6,
      Self::G => 7,
      Self::GSharp => 8,
      Self::A => 9,
      Self::ASharp => 10,
      Self::B => 11,
    }
  }
  pub fn from_ordinal(ordinal: Pitch) -> Self {
    match ordinal.rem_euclid(12) {
      0 => Self::C,
      1 => Self::CSharp,
      2 => Self::D,
      3 => Self::DSharp,
      4 => Self::E,
      5 => Self::F,
      6 => Self::FSharp,
      7 => Self::G,
      8 => Self::GSharp,
      9 => Self::A,
      10 => Self::ASharp,
      11 => Self::B,
      _ => unreachable!(),
    }
  }
  /// Sharps only. Flats and double accidentals are not recognized.
  pub fn from_spelling(spelling: &str) -> Option<Self> {
    Some(match spelling {
      "c" => Self::C,
      "c#" => Self::CSharp,
      "d" => Self::D,
      "d#" => Self::DSharp,
      "e" => Self::E,
      "f" => Self::F,
      "f#" => Self::FSharp,
      "g" => Self::G,
      "g#" => Self::GSharp,
      "a" => Self::A,
      "a#" => Self::ASharp,
      "b" => Self::B,
      _ => return None,
    })
  }
}

impl std::fmt::Display for PitchClass {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    f.write_str(match self {
      Self::C => "C",
      Self::CSharp => "C#",
      Self::D => "D",
      Self::DSharp => "D#",
      Self::E => "E",
      Self::F => "F",
      Self::FSharp => "F#",
      Self::G => "G",
      Self::GSharp => "G#",
      Self::A => "A",
      Self::ASharp => "A#",
      Self::B => "B",
    })
  }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum NoteError {
  #[error("unrecognized note {0:?}")]
  Unrecognized(String),
  #[error("note {0:?} has no octave")]
  BadOctave(String),
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NoteName {
  pub pitch_class: PitchClass,
  pub octave: i32,
}

impl NoteName {
  pub fn new(pitch_class: PitchClass, octave: i32) -> Self {
    Self {
      pitch_class,
      octave,
    }
  }
  pub fn pitch(self) -> Pitch {
    self.octave * 12 + self.pitch_class.ordinal()
  }
}

impl FromStr for NoteName {
  type Err = NoteError;
  // "c4", "F#5", "a#-1": pitch class spelling followed by the octave.
  fn from_str(s: &str) -> Result<Self, NoteError> {
    let lower = s.trim().to_ascii_lowercase();
    let split = lower
      .find(|c: char| c == '-' || c.is_ascii_digit())
      .ok_or_else(|| NoteError::BadOctave(s.to_string()))?;
    let (spelling, octave) = lower.split_at(split);
    let pitch_class =
      PitchClass::from_spelling(spelling).ok_or_else(|| NoteError::Unrecognized(s.to_string()))?;
    let octave: i32 = octave
      .parse()
      .map_err(|_| NoteError::BadOctave(s.to_string()))?;
    // The whole octave, b included, has to fit in a pitch.
    if octave.checked_mul(12).and_then(|p| p.checked_add(11)).is_none() {
      return Err(NoteError::BadOctave(s.to_string()));
    }
    Ok(Self::new(pitch_class, octave))
  }
}

impl std::fmt::Display for NoteName {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "{}{}", self.pitch_class, self.octave)
  }
}

pub fn pitch_for_note(name: &str) -> Result<Pitch, NoteError> {
  name.parse::<NoteName>().map(NoteName::pitch)
}

pub fn note_for_pitch(pitch: Pitch) -> NoteName {
  NoteName::new(PitchClass::from_ordinal(pitch), pitch.div_euclid(12))
}

#[test]
fn test_pitch_for_note() {
  assert_eq!(pitch_for_note("c4"), Ok(48));
  assert_eq!(pitch_for_note("C4"), Ok(48));
  assert_eq!(pitch_for_note("c#4"), Ok(49));
  assert_eq!(pitch_for_note("b3"), Ok(47));
  assert_eq!(pitch_for_note("a#5"), Ok(70));
  assert_eq!(pitch_for_note("c0"), Ok(0));
  assert_eq!(pitch_for_note("b-1"), Ok(-1));
  assert_eq!(pitch_for_note("c10"), Ok(120));
}

#[test]
fn test_unrecognized_notes() {
  assert_eq!(
    pitch_for_note("db4"),
    Err(NoteError::Unrecognized("db4".to_string()))
  );
  assert_eq!(
    pitch_for_note("c##4"),
    Err(NoteError::Unrecognized("c##4".to_string()))
  );
  assert_eq!(
    pitch_for_note("cs5"),
    Err(NoteError::Unrecognized("cs5".to_string()))
  );
  assert_eq!(
    pitch_for_note("h2"),
    Err(NoteError::Unrecognized("h2".to_string()))
  );
  assert_eq!(
    pitch_for_note("c"),
    Err(NoteError::BadOctave("c".to_string()))
  );
  assert_eq!(
    pitch_for_note("c-"),
    Err(NoteError::BadOctave("c-".to_string()))
  );
}

#[test]
fn test_huge_octaves() {
  assert_eq!(
    pitch_for_note("c300000000"),
    Err(NoteError::BadOctave("c300000000".to_string()))
  );
  assert_eq!(
    pitch_for_note("b-300000000"),
    Err(NoteError::BadOctave("b-300000000".to_string()))
  );
  assert_eq!(
    pitch_for_note("c99999999999"),
    Err(NoteError::BadOctave("c99999999999".to_string()))
  );
  assert_eq!(pitch_for_note("b178956969"), Ok(2147483639));
}

#[test]
fn test_note_for_pitch() {
  use PitchClass::*;
  assert_eq!(note_for_pitch(48), NoteName::new(C, 4));
  assert_eq!(note_for_pitch(61), NoteName::new(CSharp, 5));
  assert_eq!(note_for_pitch(0), NoteName::new(C, 0));
  assert_eq!(note_for_pitch(-1), NoteName::new(B, -1));
  assert_eq!(note_for_pitch(59).to_string(), "B4");
  assert_eq!(note_for_pitch(54).to_string(), "F#4");
}

#[test]
fn test_sharp_names_round_trip() {
  let spellings = [
    "c", "c#", "d", "d#", "e", "f", "f#", "g", "g#", "a", "a#", "b",
  ];
  for octave in 0..9 {
    for spelling in spellings.iter() {
      let name: NoteName = format!("{}{}", spelling, octave).parse().unwrap();
      assert_eq!(note_for_pitch(name.pitch()), name);
    }
  }
}
