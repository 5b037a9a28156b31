use crate::grid::KeyboardGrid;
use crate::layout::Layout;
use crate::midi::ChannelOutput;
use crate::theory::{note_for_pitch, Pitch};
use fnv::FnvHashMap;

pub const VELOCITY: u8 = 100;

/// Octave offsets are clamped to this many octaves either way.
pub const MAX_OCTAVE_OFFSET: i32 = 10;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Change {
  NoteStarted { key: char, pitch: Pitch },
  NoteStopped { key: char, pitch: Pitch },
  AllStopped,
  Octave(i32),
  Layout(&'static str),
}

pub type Observer<'a> = Box<dyn FnMut(&Change) + 'a>;

/// Turns key presses into note on/off calls, once per press.
///
/// A key is either idle or sounding. The pitch a key sounds is fixed when it
/// goes down: later octave or layout changes do not touch it.
pub struct KeyStateTracker<'a> {
  grid: &'a KeyboardGrid,
  layout: &'a Layout,
  sounding: FnvHashMap<char, Pitch>,
  octave_offset: i32,
  observers: Vec<Observer<'a>>,
}

impl<'a> KeyStateTracker<'a> {
  pub fn new(grid: &'a KeyboardGrid, layout: &'a Layout) -> Self {
    Self {
      grid,
      layout,
      sounding: FnvHashMap::default(),
      octave_offset: 0,
      observers: Vec::new(),
    }
  }

  pub fn subscribe(&mut self, observer: Observer<'a>) {
    self.observers.push(observer);
  }

  fn notify(&mut self, change: Change) {
    log::debug!("{:?}", change);
    for observer in self.observers.iter_mut() {
      observer(&change);
    }
  }

  fn fold(key: char) -> char {
    key.to_ascii_lowercase()
  }

  pub fn on_key_down<C>(&mut self, key: char, out: &mut C) -> anyhow::Result<()>
  where
    C: ChannelOutput + ?Sized,
  {
    let key = Self::fold(key);
    if self.sounding.contains_key(&key) {
      return Ok(());
    }
    let pitch = match self.pitch_for_key(key) {
      Some(pitch) => pitch,
      None => return Ok(()),
    };
    self.sounding.insert(key, pitch);
    let sent = out.note_on(pitch, VELOCITY);
    self.notify(Change::NoteStarted { key, pitch });
    sent
  }

  pub fn on_key_up<C>(&mut self, key: char, out: &mut C) -> anyhow::Result<()>
  where
    C: ChannelOutput + ?Sized,
  {
    let key = Self::fold(key);
    let pitch = match self.sounding.remove(&key) {
      Some(pitch) => pitch,
      None => return Ok(()),
    };
    let sent = out.note_off(pitch, VELOCITY);
    self.notify(Change::NoteStopped { key, pitch });
    sent
  }

  /// Focus lost: silence everything so no note is left hanging.
  pub fn on_deactivate<C>(&mut self, out: &mut C) -> anyhow::Result<()>
  where
    C: ChannelOutput + ?Sized,
  {
    self.sounding.clear();
    let sent = out.all_notes_off();
    self.notify(Change::AllStopped);
    sent
  }

  pub fn set_octave_offset(&mut self, delta: i32) {
    self.octave_offset = self
      .octave_offset
      .saturating_add(delta)
      .clamp(-MAX_OCTAVE_OFFSET, MAX_OCTAVE_OFFSET);
    self.notify(Change::Octave(self.octave_offset));
  }

  pub fn set_layout(&mut self, layout: &'a Layout) {
    self.layout = layout;
    self.notify(Change::Layout(layout.label()));
  }

  pub fn current_layout_label(&self) -> &'static str {
    self.layout.label()
  }

  pub fn current_octave_offset(&self) -> i32 {
    self.octave_offset
  }

  pub fn grid(&self) -> &'a KeyboardGrid {
    self.grid
  }

  pub fn active_notes(&self) -> impl Iterator<Item = char> + '_ {
    self.sounding.keys().copied()
  }

  pub fn is_sounding(&self, key: char) -> bool {
    self.sounding.contains_key(&Self::fold(key))
  }

  /// What `key` would play if pressed now, octave offset included.
  pub fn pitch_for_key(&self, key: char) -> Option<Pitch> {
    let pitch = self.layout.pitch_for_key(self.grid, key)?;
    pitch.checked_add(self.octave_offset.checked_mul(12)?)
  }

  pub fn describe(&self) -> String {
    let mut notes: Vec<_> = self
      .sounding
      .iter()
      .map(|(&key, &pitch)| format!("{}={}", key, note_for_pitch(pitch)))
      .collect();
    notes.sort();
    format!(
      "{} octave {:+} sounding [{}]",
      self.current_layout_label(),
      self.octave_offset,
      notes.join(" ")
    )
  }
}

#[cfg(test)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Sent {
  On(Pitch, u8),
  Off(Pitch, u8),
  AllOff,
  Program(u16, u8),
}

/// Records every call instead of making sound.
#[cfg(test)]
#[derive(Default)]
pub struct Recorder(pub Vec<Sent>);

#[cfg(test)]
impl ChannelOutput for Recorder {
  fn note_on(&mut self, pitch: Pitch, velocity: u8) -> anyhow::Result<()> {
    self.0.push(Sent::On(pitch, velocity));
    Ok(())
  }
  fn note_off(&mut self, pitch: Pitch, velocity: u8) -> anyhow::Result<()> {
    self.0.push(Sent::Off(pitch, velocity));
    Ok(())
  }
  fn all_notes_off(&mut self) -> anyhow::Result<()> {
    self.0.push(Sent::AllOff);
    Ok(())
  }
  fn program_change(&mut self, bank: u16, program: u8) -> anyhow::Result<()> {
    self.0.push(Sent::Program(bank, program));
    Ok(())
  }
}

#[cfg(test)]
use crate::layout::LayoutKind;

#[cfg(test)]
fn fixture() -> (KeyboardGrid, crate::layout::Layouts) {
  (
    KeyboardGrid::new(crate::grid::GridKind::Qwerty).unwrap(),
    crate::layout::Layouts::new(48).unwrap(),
  )
}

#[cfg(test)]
fn sorted_notes(tracker: &KeyStateTracker) -> Vec<char> {
  let mut keys: Vec<_> = tracker.active_notes().collect();
  keys.sort();
  keys
}

#[test]
fn test_repeat_press_is_ignored() {
  let (grid, layouts) = fixture();
  let mut tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  let mut out = Recorder::default();
  tracker.on_key_down('a', &mut out).unwrap();
  tracker.on_key_down('a', &mut out).unwrap();
  tracker.on_key_down('A', &mut out).unwrap();
  assert_eq!(out.0, vec![Sent::On(53, VELOCITY)]);
  assert!(tracker.is_sounding('a'));
}

#[test]
fn test_repeat_release_is_ignored() {
  let (grid, layouts) = fixture();
  let mut tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  let mut out = Recorder::default();
  tracker.on_key_up('a', &mut out).unwrap();
  tracker.on_key_down('a', &mut out).unwrap();
  tracker.on_key_up('a', &mut out).unwrap();
  tracker.on_key_up('a', &mut out).unwrap();
  assert_eq!(
    out.0,
    vec![Sent::On(53, VELOCITY), Sent::Off(53, VELOCITY)]
  );
  assert!(!tracker.is_sounding('a'));
  assert_eq!(sorted_notes(&tracker), Vec::<char>::new());
}

#[test]
fn test_deactivate() {
  let (grid, layouts) = fixture();
  let mut tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  let mut out = Recorder::default();
  for &key in ['z', 'x', 'q'].iter() {
    tracker.on_key_down(key, &mut out).unwrap();
  }
  assert_eq!(sorted_notes(&tracker), vec!['q', 'x', 'z']);
  out.0.clear();
  tracker.on_deactivate(&mut out).unwrap();
  assert_eq!(out.0, vec![Sent::AllOff]);
  assert_eq!(sorted_notes(&tracker), Vec::<char>::new());
  // Releasing after the fact sends nothing.
  tracker.on_key_up('z', &mut out).unwrap();
  assert_eq!(out.0, vec![Sent::AllOff]);
  // Nothing sounding is still fine.
  tracker.on_deactivate(&mut out).unwrap();
  assert_eq!(out.0, vec![Sent::AllOff, Sent::AllOff]);
}

#[test]
fn test_octave_offset_applies_at_press() {
  let (grid, layouts) = fixture();
  let mut tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  let mut out = Recorder::default();
  tracker.on_key_down('z', &mut out).unwrap();
  tracker.set_octave_offset(1);
  assert_eq!(tracker.current_octave_offset(), 1);
  assert_eq!(tracker.pitch_for_key('z'), Some(60));
  tracker.on_key_down('x', &mut out).unwrap();
  tracker.on_key_up('z', &mut out).unwrap();
  tracker.set_octave_offset(-3);
  tracker.on_key_up('x', &mut out).unwrap();
  assert_eq!(
    out.0,
    vec![
      Sent::On(48, VELOCITY),
      Sent::On(61, VELOCITY),
      Sent::Off(48, VELOCITY),
      Sent::Off(61, VELOCITY),
    ]
  );
  assert_eq!(tracker.pitch_for_key('z'), Some(24));
}

#[test]
fn test_octave_offset_is_clamped() {
  let (grid, layouts) = fixture();
  let mut tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  let mut out = Recorder::default();
  tracker.set_octave_offset(200_000_000);
  assert_eq!(tracker.current_octave_offset(), MAX_OCTAVE_OFFSET);
  tracker.set_octave_offset(i32::MAX);
  assert_eq!(tracker.current_octave_offset(), MAX_OCTAVE_OFFSET);
  tracker.on_key_down('z', &mut out).unwrap();
  assert_eq!(out.0, vec![Sent::On(168, VELOCITY)]);
  tracker.set_octave_offset(i32::MIN);
  assert_eq!(tracker.current_octave_offset(), -MAX_OCTAVE_OFFSET);
  assert_eq!(tracker.pitch_for_key('z'), Some(-72));
}

#[test]
fn test_observers_see_state_after_send() {
  use std::cell::RefCell;
  use std::rc::Rc;
  struct Shared(Rc<RefCell<Vec<String>>>);
  impl ChannelOutput for Shared {
    fn note_on(&mut self, pitch: Pitch, _velocity: u8) -> anyhow::Result<()> {
      self.0.borrow_mut().push(format!("on {}", pitch));
      Ok(())
    }
    fn note_off(&mut self, pitch: Pitch, _velocity: u8) -> anyhow::Result<()> {
      self.0.borrow_mut().push(format!("off {}", pitch));
      Ok(())
    }
    fn all_notes_off(&mut self) -> anyhow::Result<()> {
      self.0.borrow_mut().push("all off".to_string());
      Ok(())
    }
    fn program_change(&mut self, _bank: u16, _program: u8) -> anyhow::Result<()> {
      Ok(())
    }
  }
  let (grid, layouts) = fixture();
  let log = Rc::new(RefCell::new(Vec::new()));
  let seen = log.clone();
  let mut tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  tracker.subscribe(Box::new(move |change: &Change| {
    seen.borrow_mut().push(format!("{:?}", change))
  }));
  let mut out = Shared(log.clone());
  tracker.on_key_down('z', &mut out).unwrap();
  tracker.on_key_up('z', &mut out).unwrap();
  tracker.on_deactivate(&mut out).unwrap();
  assert_eq!(
    *log.borrow(),
    vec![
      "on 48",
      "NoteStarted { key: 'z', pitch: 48 }",
      "off 48",
      "NoteStopped { key: 'z', pitch: 48 }",
      "all off",
      "AllStopped",
    ]
  );
}

#[test]
fn test_layout_change_keeps_sounding_pitch() {
  let (grid, layouts) = fixture();
  let mut tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  let mut out = Recorder::default();
  tracker.on_key_down('c', &mut out).unwrap();
  tracker.set_layout(layouts.get(LayoutKind::WholeTone));
  assert_eq!(tracker.current_layout_label(), "Whole Tone");
  assert_eq!(tracker.pitch_for_key('c'), Some(52));
  tracker.on_key_up('c', &mut out).unwrap();
  assert_eq!(
    out.0,
    vec![Sent::On(50, VELOCITY), Sent::Off(50, VELOCITY)]
  );
}

#[test]
fn test_unmapped_key() {
  let (grid, layouts) = fixture();
  let mut tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Scale));
  let mut out = Recorder::default();
  tracker.on_key_down('`', &mut out).unwrap();
  tracker.on_key_down(' ', &mut out).unwrap();
  tracker.on_key_up('`', &mut out).unwrap();
  assert_eq!(tracker.pitch_for_key('`'), None);
  assert!(out.0.is_empty());
  assert_eq!(sorted_notes(&tracker), Vec::<char>::new());
}

#[test]
fn test_same_pitch_from_two_keys() {
  let (grid, layouts) = fixture();
  let mut tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Scale));
  let mut out = Recorder::default();
  tracker.on_key_down('b', &mut out).unwrap();
  tracker.on_key_down('m', &mut out).unwrap();
  tracker.on_key_up('b', &mut out).unwrap();
  assert_eq!(
    out.0,
    vec![
      Sent::On(55, VELOCITY),
      Sent::On(55, VELOCITY),
      Sent::Off(55, VELOCITY),
    ]
  );
  assert_eq!(sorted_notes(&tracker), vec!['m']);
}

#[test]
fn test_observers() {
  use std::cell::RefCell;
  let (grid, layouts) = fixture();
  let seen = RefCell::new(Vec::new());
  let mut tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  tracker.subscribe(Box::new(|change: &Change| seen.borrow_mut().push(change.clone())));
  let mut out = Recorder::default();
  tracker.on_key_down('z', &mut out).unwrap();
  tracker.on_key_down('z', &mut out).unwrap();
  tracker.set_octave_offset(-1);
  tracker.set_layout(layouts.get(LayoutKind::Pentatonic));
  tracker.on_key_up('z', &mut out).unwrap();
  tracker.on_deactivate(&mut out).unwrap();
  drop(tracker);
  assert_eq!(
    seen.into_inner(),
    vec![
      Change::NoteStarted { key: 'z', pitch: 48 },
      Change::Octave(-1),
      Change::Layout("Pentatonic"),
      Change::NoteStopped { key: 'z', pitch: 48 },
      Change::AllStopped,
    ]
  );
}

#[test]
fn test_describe() {
  let (grid, layouts) = fixture();
  let mut tracker = KeyStateTracker::new(&grid, layouts.get(LayoutKind::Chromatic));
  let mut out = Recorder::default();
  tracker.on_key_down('x', &mut out).unwrap();
  tracker.on_key_down('z', &mut out).unwrap();
  tracker.set_octave_offset(2);
  assert_eq!(
    tracker.describe(),
    "Chromatic octave +2 sounding [x=C#4 z=C4]"
  );
}
