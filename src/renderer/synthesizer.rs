//! 姿态合成器: 用手腕高度演奏音符
//!
//! 每个身份按 `id % 3` 分到一个声部。右手腕高度选音 (两个八度的大调五声音阶),
//! 左手腕高度决定力度。每个 tick 与上一 tick 的音符集合比较,
//! 只发送变化的 note-off / note-on。音频合成由外部的 `NoteSink` 负责。

use super::{draw_pose, SvgCanvas};
use crate::detection::tracker::IdentityTracker;
use crate::detection::types::{InferenceResult, KeypointType};
use crate::pipeline::render::{RenderContext, RenderOutput, RenderStrategy};
use std::collections::BTreeMap;
use tracing::info;

// ========== 音阶与声部 ==========

pub const OCTAVE: u8 = 12;

/// 大调五声音阶 (C D E G A)
pub const SCALE: [u8; 5] = [0, 2, 4, 7, 9];

/// General MIDI 音色
pub const OVERDRIVEN_GUITAR: u8 = 30;
pub const ELECTRIC_BASS_FINGER: u8 = 34;
pub const VOICE_OOHS: u8 = 54;

/// 声部: 颜色、起始音、MIDI 通道与音色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub color: &'static str,
    pub base_note: u8,
    pub channel: u8,
    pub program: u8,
    /// 可演奏的音阶级数
    pub extent: u8,
}

pub const IDENTITIES: [Voice; 3] = [
    Voice {
        color: "cyan",
        base_note: 24,
        channel: 0,
        program: OVERDRIVEN_GUITAR,
        extent: 2 * OCTAVE,
    },
    Voice {
        color: "magenta",
        base_note: 12,
        channel: 1,
        program: ELECTRIC_BASS_FINGER,
        extent: 2 * OCTAVE,
    },
    Voice {
        color: "yellow",
        base_note: 36,
        channel: 2,
        program: VOICE_OOHS,
        extent: 2 * OCTAVE,
    },
];

impl Voice {
    pub fn for_identity(id: u64) -> &'static Voice {
        &IDENTITIES[(id % IDENTITIES.len() as u64) as usize]
    }

    /// 音阶级数 → MIDI 音高
    pub fn note(&self, step: u8) -> u8 {
        let n = SCALE.len() as u8;
        self.base_note + OCTAVE * (step / n) + SCALE[(step % n) as usize]
    }
}

// ========== 音符输出 ==========

/// (通道, 音高)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Note {
    pub channel: u8,
    pub pitch: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    On { note: Note, velocity: u8 },
    Off { note: Note },
}

/// 音符接收端 (外部合成器)
pub trait NoteSink: Send {
    fn send(&mut self, event: NoteEvent) -> anyhow::Result<()>;
}

impl NoteSink for Vec<NoteEvent> {
    fn send(&mut self, event: NoteEvent) -> anyhow::Result<()> {
        self.push(event);
        Ok(())
    }
}

/// 只记日志的接收端
#[derive(Debug, Default)]
pub struct LoggingNoteSink {
    pub events: u64,
}

impl NoteSink for LoggingNoteSink {
    fn send(&mut self, event: NoteEvent) -> anyhow::Result<()> {
        self.events += 1;
        match event {
            NoteEvent::On { note, velocity } => {
                info!("🎵 note on  ch{} 音高{} 力度{}", note.channel, note.pitch, velocity)
            }
            NoteEvent::Off { note } => info!("🔇 note off ch{} 音高{}", note.channel, note.pitch),
        }
        Ok(())
    }
}

// ========== 合成器 ==========

pub struct Synthesizer<N> {
    tracker: IdentityTracker,
    sink: N,
    prev_notes: BTreeMap<Note, u8>,
}

impl<N: NoteSink> Synthesizer<N> {
    pub fn new(keypoint_threshold: f32, sink: N) -> Self {
        Self {
            tracker: IdentityTracker::new(keypoint_threshold),
            sink,
            prev_notes: BTreeMap::new(),
        }
    }

    pub fn sink(&self) -> &N {
        &self.sink
    }

    /// 当前正在发声的音符
    pub fn sounding(&self) -> impl Iterator<Item = &Note> {
        self.prev_notes.keys()
    }
}

impl<N: NoteSink> RenderStrategy for Synthesizer<N> {
    fn render(&mut self, result: &InferenceResult, ctx: &RenderContext) -> anyhow::Result<RenderOutput> {
        let height = ctx.inference_size.height as f32;
        let threshold = self.tracker.threshold();
        let tracked = self.tracker.assign(result.poses.iter().cloned());

        let mut notes: BTreeMap<Note, u8> = BTreeMap::new();
        for t in tracked {
            let (Some(left), Some(right)) = (
                t.pose.keypoints.get(&KeypointType::LeftWrist),
                t.pose.keypoints.get(&KeypointType::RightWrist),
            ) else {
                continue;
            };

            let voice = Voice::for_identity(t.id);
            // 手腕越高值越大,超出画面的按边界算
            let left = (1.0 - left.point.y / height).clamp(0.0, 1.0);
            let right = (1.0 - right.point.y / height).clamp(0.0, 1.0);
            let velocity = (left * 100.0) as u8;
            let step = (right * voice.extent as f32) as u8;
            let note = Note {
                channel: voice.channel,
                pitch: voice.note(step),
            };
            notes.insert(note, velocity);
        }

        for note in self.prev_notes.keys() {
            if !notes.contains_key(note) {
                self.sink.send(NoteEvent::Off { note: *note })?;
            }
        }
        for (note, velocity) in &notes {
            if !self.prev_notes.contains_key(note) {
                self.sink.send(NoteEvent::On {
                    note: *note,
                    velocity: *velocity,
                })?;
            }
        }

        let mut canvas = SvgCanvas::new(ctx.source_size);
        for t in tracked {
            let voice = Voice::for_identity(t.id);
            draw_pose(&mut canvas, &t.pose, ctx, threshold, voice.color);
        }
        self.prev_notes = notes;

        Ok(RenderOutput::overlay(canvas.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::Pose;
    use crate::pipeline::geometry::{CropBox, Size};
    use std::time::Instant;

    fn ctx() -> RenderContext {
        RenderContext {
            source_size: Size::new(100, 100),
            inference_size: Size::new(100, 100),
            crop_box: CropBox { x: 0, y: 0, width: 100, height: 100 },
            now: Instant::now(),
        }
    }

    fn player(x: f32, left_y: f32, right_y: f32) -> Pose {
        Pose::new(0.9)
            .with_keypoint(KeypointType::LeftWrist, x, left_y, 0.9)
            .with_keypoint(KeypointType::RightWrist, x + 10.0, right_y, 0.9)
    }

    fn render(synth: &mut Synthesizer<Vec<NoteEvent>>, poses: Vec<Pose>) {
        let result = InferenceResult { poses, latency_ms: 1.0 };
        synth.render(&result, &ctx()).unwrap();
    }

    #[test]
    fn test_scale_mapping() {
        let guitar = IDENTITIES[0];
        assert_eq!(guitar.note(0), 24);
        assert_eq!(guitar.note(4), 33);
        assert_eq!(guitar.note(5), 36);
        assert_eq!(guitar.note(24), 24 + 48 + 9);
        assert_eq!(Voice::for_identity(4).color, "magenta");
    }

    #[test]
    fn test_note_on_then_off() {
        let mut synth = Synthesizer::new(0.2, Vec::new());
        // 左腕 y=50 → 力度 50; 右腕 y=100 → 第 0 级
        render(&mut synth, vec![player(20.0, 50.0, 100.0)]);
        let on = Note { channel: 0, pitch: 24 };
        assert_eq!(synth.sink(), &vec![NoteEvent::On { note: on, velocity: 50 }]);

        // 同一音符保持,不重复发送
        render(&mut synth, vec![player(21.0, 40.0, 100.0)]);
        assert_eq!(synth.sink().len(), 1);

        render(&mut synth, Vec::new());
        assert_eq!(synth.sink()[1], NoteEvent::Off { note: on });
        assert_eq!(synth.sounding().count(), 0);
    }

    #[test]
    fn test_note_change_sends_off_before_on() {
        let mut synth = Synthesizer::new(0.2, Vec::new());
        render(&mut synth, vec![player(20.0, 50.0, 100.0)]);
        // 右腕 y=0 → 第 24 级
        render(&mut synth, vec![player(20.0, 50.0, 0.0)]);
        let events = synth.sink();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], NoteEvent::Off { .. }));
        assert_eq!(
            events[2],
            NoteEvent::On {
                note: Note { channel: 0, pitch: 81 },
                velocity: 50
            }
        );
    }

    #[test]
    fn test_second_identity_uses_bass() {
        let mut synth = Synthesizer::new(0.2, Vec::new());
        render(&mut synth, vec![player(10.0, 50.0, 100.0), player(70.0, 50.0, 100.0)]);
        let channels: Vec<u8> = synth.sounding().map(|n| n.channel).collect();
        assert_eq!(channels, vec![0, 1]);
    }

    #[test]
    fn test_missing_wrist_is_silent() {
        let mut synth = Synthesizer::new(0.2, Vec::new());
        let one_hand = Pose::new(0.9).with_keypoint(KeypointType::LeftWrist, 5.0, 5.0, 0.9);
        render(&mut synth, vec![one_hand]);
        assert!(synth.sink().is_empty());
    }
}
