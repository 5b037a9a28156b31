use crate::theory::{note_for_pitch, Pitch};
use anyhow::anyhow;
use midi::{RawMessage, ToRawMessages};
use midir::{MidiOutput, MidiOutputConnection};

pub use midi::{Channel, Message};

/// The sound-producing end of the pipeline.
pub trait ChannelOutput {
  fn note_on(&mut self, pitch: Pitch, velocity: u8) -> anyhow::Result<()>;
  fn note_off(&mut self, pitch: Pitch, velocity: u8) -> anyhow::Result<()>;
  fn all_notes_off(&mut self) -> anyhow::Result<()>;
  fn program_change(&mut self, bank: u16, program: u8) -> anyhow::Result<()>;
}

pub trait MessageExt {
  fn encode(&self) -> Vec<u8>;
}

impl MessageExt for Message {
  fn encode(&self) -> Vec<u8> {
    let mut dest = Vec::new();
    for msg in self.to_raw_messages().into_iter() {
      match msg {
        RawMessage::Status(a) => dest.extend_from_slice(&[a | 0x80]),
        RawMessage::StatusData(a, b) => dest.extend_from_slice(&[a | 0x80, b]),
        RawMessage::StatusDataData(a, b, c) => dest.extend_from_slice(&[a | 0x80, b, c]),
        RawMessage::Raw(a) => dest.extend_from_slice(&[a]),
      }
    }
    dest
  }
}

/// Zero-based channel index, as shown to the user.
pub fn channel(index: u8) -> Option<Channel> {
  use Channel::*;
  Some(match index {
    0 => Ch1,
    1 => Ch2,
    2 => Ch3,
    3 => Ch4,
    4 => Ch5,
    5 => Ch6,
    6 => Ch7,
    7 => Ch8,
    8 => Ch9,
    9 => Ch10,
    10 => Ch11,
    11 => Ch12,
    12 => Ch13,
    13 => Ch14,
    14 => Ch15,
    15 => Ch16,
    _ => return None,
  })
}

fn midi_note(pitch: Pitch) -> Option<u8> {
  if (0..=127).contains(&pitch) {
    Some(pitch as u8)
  } else {
    log::warn!(
      "pitch {} ({}) is outside the midi note range; dropping",
      pitch,
      note_for_pitch(pitch)
    );
    None
  }
}

/// Bank select (MSB, LSB) followed by the program change itself.
fn program_messages(channel: Channel, bank: u16, program: u8) -> Vec<Message> {
  vec![
    Message::ControlChange(channel, 0, ((bank >> 7) & 0x7f) as u8),
    Message::ControlChange(channel, 32, (bank & 0x7f) as u8),
    Message::ProgramChange(channel, program & 0x7f),
  ]
}

/// Sends to one channel of a midir output connection.
pub struct MidiChannel {
  conn: MidiOutputConnection,
  channel: Channel,
}

impl MidiChannel {
  pub fn new(conn: MidiOutputConnection, channel: Channel) -> Self {
    Self { conn, channel }
  }
  pub fn set_channel(&mut self, channel: Channel) {
    self.channel = channel;
  }
  fn send(&mut self, message: Message) -> anyhow::Result<()> {
    log::trace!("sending {:?}", message);
    self
      .conn
      .send(&message.encode())
      .map_err(|e| anyhow!("midi send failed: {}", e))
  }
}

impl ChannelOutput for MidiChannel {
  fn note_on(&mut self, pitch: Pitch, velocity: u8) -> anyhow::Result<()> {
    match midi_note(pitch) {
      Some(note) => self.send(Message::NoteOn(self.channel, note, velocity)),
      None => Ok(()),
    }
  }
  fn note_off(&mut self, pitch: Pitch, velocity: u8) -> anyhow::Result<()> {
    match midi_note(pitch) {
      Some(note) => self.send(Message::NoteOff(self.channel, note, velocity)),
      None => Ok(()),
    }
  }
  fn all_notes_off(&mut self) -> anyhow::Result<()> {
    self.send(Message::AllNotesOff(self.channel))
  }
  fn program_change(&mut self, bank: u16, program: u8) -> anyhow::Result<()> {
    for message in program_messages(self.channel, bank, program) {
      self.send(message)?;
    }
    Ok(())
  }
}

/// Dry run: logs what would have been sent.
pub struct LogChannel {
  channel: Channel,
}

impl LogChannel {
  pub fn new(channel: Channel) -> Self {
    Self { channel }
  }
  pub fn set_channel(&mut self, channel: Channel) {
    self.channel = channel;
  }
}

impl ChannelOutput for LogChannel {
  fn note_on(&mut self, pitch: Pitch, velocity: u8) -> anyhow::Result<()> {
    log::info!(
      "{:?}: note on {} ({}) velocity {}",
      self.channel,
      pitch,
      note_for_pitch(pitch),
      velocity
    );
    Ok(())
  }
  fn note_off(&mut self, pitch: Pitch, velocity: u8) -> anyhow::Result<()> {
    log::info!(
      "{:?}: note off {} ({}) velocity {}",
      self.channel,
      pitch,
      note_for_pitch(pitch),
      velocity
    );
    Ok(())
  }
  fn all_notes_off(&mut self) -> anyhow::Result<()> {
    log::info!("{:?}: all notes off", self.channel);
    Ok(())
  }
  fn program_change(&mut self, bank: u16, program: u8) -> anyhow::Result<()> {
    log::info!(
      "{:?}: bank {} program {}",
      self.channel,
      bank,
      program
    );
    Ok(())
  }
}

pub fn port_names() -> anyhow::Result<Vec<String>> {
  let output = MidiOutput::new("musical-keys").map_err(|e| anyhow!("{}", e))?;
  Ok(
    output
      .ports()
      .iter()
      .filter_map(|port| output.port_name(port).ok())
      .collect(),
  )
}

/// Connects to the first output port whose name contains `pattern`.
pub fn connect(pattern: &str) -> anyhow::Result<MidiOutputConnection> {
  let output = MidiOutput::new("musical-keys").map_err(|e| anyhow!("{}", e))?;
  let ports = output.ports();
  let port = ports
    .iter()
    .find(|port| {
      output
        .port_name(port)
        .unwrap_or_default()
        .contains(pattern)
    })
    .ok_or_else(|| anyhow!("no midi output port matching {:?}", pattern))?;
  log::info!(
    "using midi output port {}",
    output.port_name(port).unwrap_or_default()
  );
  output
    .connect(port, "musical-keys")
    .map_err(|e| anyhow!("unable to connect to midi port: {}", e))
}

#[test]
fn test_encode() {
  assert_eq!(
    Message::NoteOn(Channel::Ch1, 48, 100).encode(),
    vec![0x90, 48, 100]
  );
  assert_eq!(
    Message::NoteOff(Channel::Ch3, 60, 100).encode(),
    vec![0x82, 60, 100]
  );
}

#[test]
fn test_program_messages() {
  let bytes: Vec<u8> = program_messages(Channel::Ch1, 130, 5)
    .iter()
    .flat_map(MessageExt::encode)
    .collect();
  assert_eq!(bytes, vec![0xb0, 0, 1, 0xb0, 32, 2, 0xc0, 5]);
}

#[test]
fn test_channel_index() {
  assert_eq!(channel(0), Some(Channel::Ch1));
  assert_eq!(channel(15), Some(Channel::Ch16));
  assert_eq!(channel(16), None);
}

#[test]
fn test_midi_note_range() {
  assert_eq!(midi_note(0), Some(0));
  assert_eq!(midi_note(127), Some(127));
  assert_eq!(midi_note(128), None);
  assert_eq!(midi_note(-1), None);
}
