use std::time::Duration;

use tracing::info;

use crate::{
    actuator::{ActuationSink, LightChannel},
    config::LightConfig,
    Result,
};

const PULSE_STEPS: u32 = 50;
const PULSE_STEP: Duration = Duration::from_millis(100);

/// One stage of the verification sequence: fixed per-channel fractions of
/// the brightness cap, or `None` for the sinusoidal pulse.
struct Stage {
    label: &'static str,
    levels: Option<[f32; 2]>,
    hold: Duration,
}

const STAGES: [Stage; 5] = [
    Stage {
        label: "full brightness",
        levels: Some([1.0, 1.0]),
        hold: Duration::from_secs(2),
    },
    Stage {
        label: "channel 1 only",
        levels: Some([1.0, 0.0]),
        hold: Duration::from_secs(1),
    },
    Stage {
        label: "channel 2 only",
        levels: Some([0.0, 1.0]),
        hold: Duration::from_secs(1),
    },
    Stage {
        label: "half brightness",
        levels: Some([0.5, 0.5]),
        hold: Duration::from_secs(1),
    },
    Stage {
        label: "slow pulse",
        levels: None,
        hold: PULSE_STEP,
    },
];

/// Drives the sink through the fixed hardware verification sequence,
/// independent of any audio input: full brightness, each channel alone,
/// half brightness, then a slow sinusoidal pulse. Ends dark.
///
/// The pause between steps is injected so tests run without sleeping.
pub fn hardware_check<A, F>(sink: &mut A, lights: &LightConfig, mut pause: F) -> Result<()>
where
    A: ActuationSink,
    F: FnMut(Duration),
{
    let cap = lights.max_brightness;
    let result = run_stages(sink, cap, &mut pause);
    // Dark on every path.
    let teardown = sink.all_off();
    result.and(teardown)
}

fn run_stages<A, F>(sink: &mut A, cap: f32, pause: &mut F) -> Result<()>
where
    A: ActuationSink,
    F: FnMut(Duration),
{
    for stage in &STAGES {
        info!(stage = stage.label, "verification stage");
        match stage.levels {
            Some(levels) => {
                for channel in LightChannel::ALL {
                    sink.set_duty_cycle(channel, levels[channel.index()] * cap)?;
                }
                pause(stage.hold);
            }
            None => {
                for step in 0..PULSE_STEPS {
                    let level = ((step as f32 * 0.2).sin() + 1.0) * 0.5 * cap;
                    for channel in LightChannel::ALL {
                        sink.set_duty_cycle(channel, level)?;
                    }
                    pause(stage.hold);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::MemorySink;

    #[test]
    fn sequence_hits_every_stage_and_ends_dark() {
        let lights = LightConfig::default();
        let mut sink = MemorySink::new(&lights);
        let handle = sink.clone();
        let mut pauses = Vec::new();

        hardware_check(&mut sink, &lights, |hold| pauses.push(hold)).unwrap();

        // Four fixed stages plus fifty pulse steps.
        assert_eq!(pauses.len(), 4 + 50);
        assert_eq!(handle.levels(), [0.0, 0.0]);

        let history = handle.history();
        // Full brightness reaches the cap on both channels.
        assert_eq!(history[0], (0, 0.83));
        assert_eq!(history[1], (1, 0.83));
        // Single-channel stages leave the other channel dark.
        assert_eq!(history[2], (0, 0.83));
        assert_eq!(history[3], (1, 0.0));
        assert_eq!(history[4], (0, 0.0));
        assert_eq!(history[5], (1, 0.83));
        // Nothing ever exceeds the cap.
        assert!(handle.max_commanded() <= 0.83);
    }

    #[test]
    fn pulse_stays_within_the_cap() {
        let lights = LightConfig::default();
        let mut sink = MemorySink::new(&lights);
        let handle = sink.clone();

        hardware_check(&mut sink, &lights, |_| {}).unwrap();

        for (_, level) in handle.history() {
            assert!((0.0..=0.83).contains(&level));
        }
    }
}
