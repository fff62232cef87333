//! Command translation: operator input to a protocol-neutral velocity.
//!
//! Translation is a pure function of the command and, for the `pinch`
//! gesture only, the wall-clock instant it is evaluated at.
//!
//! | Input | `linear` | `angular` |
//! |-------|----------|-----------|
//! | gesture `open` | `x = (0.5 - hand.y) * 2` | `z = (hand.x - 0.5) * 2` |
//! | gesture `pinch` | zero | `z = 0.5 * sin(t)` |
//! | gesture `fist` | zero | zero |
//! | gesture `point` | `x = 0.3` | zero |
//! | other gesture | zero | zero |
//! | manual | pass-through | pass-through |
//! | stop / emergency stop | zero | zero |

use chrono::{DateTime, Utc};

use super::command::{Command, CommandKind, GestureType, HandPosition, Vector3, VelocityVector};

/// Forward speed for the `point` gesture.
pub const POINT_FORWARD_SPEED: f64 = 0.3;

/// Amplitude of the `pinch` spin.
pub const PINCH_SPIN_AMPLITUDE: f64 = 0.5;

/// Translates an issued command, evaluating time-dependent gestures now.
#[must_use]
pub fn translate(command: &Command) -> VelocityVector {
    translate_at(command.kind(), Utc::now())
}

/// Translates a command payload, evaluating time-dependent gestures at `now`.
#[must_use]
pub fn translate_at(kind: &CommandKind, now: DateTime<Utc>) -> VelocityVector {
    match kind {
        CommandKind::Manual { linear, angular } => VelocityVector {
            linear: *linear,
            angular: *angular,
        },
        CommandKind::Gesture {
            gesture_type,
            hand_position,
            ..
        } => translate_gesture(*gesture_type, hand_position, now),
        CommandKind::Stop | CommandKind::EmergencyStop => VelocityVector::ZERO,
    }
}

fn translate_gesture(gesture: GestureType, hand: &HandPosition, now: DateTime<Utc>) -> VelocityVector {
    match gesture {
        GestureType::Open => VelocityVector {
            linear: Vector3::new(clamp_unit((0.5 - hand.y) * 2.0), 0.0, 0.0),
            angular: Vector3::new(0.0, 0.0, clamp_unit((hand.x - 0.5) * 2.0)),
        },
        GestureType::Pinch => VelocityVector {
            linear: Vector3::ZERO,
            angular: Vector3::new(0.0, 0.0, PINCH_SPIN_AMPLITUDE * wall_clock_secs(now).sin()),
        },
        GestureType::Point => VelocityVector {
            linear: Vector3::new(POINT_FORWARD_SPEED, 0.0, 0.0),
            angular: Vector3::ZERO,
        },
        GestureType::Fist | GestureType::Unknown => VelocityVector::ZERO,
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(-1.0, 1.0)
}

#[allow(clippy::cast_precision_loss)]
fn wall_clock_secs(now: DateTime<Utc>) -> f64 {
    now.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gesture(gesture_type: GestureType, x: f64, y: f64, confidence: f64) -> CommandKind {
        CommandKind::Gesture {
            gesture_type,
            hand_position: HandPosition { x, y, z: 0.0 },
            confidence,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn fist_is_zero_regardless_of_hand_and_confidence() {
        for (x, y, c) in [(0.0, 0.0, 0.1), (0.9, 0.2, 0.99), (0.5, 0.5, 0.0)] {
            let v = translate_at(&gesture(GestureType::Fist, x, y, c), Utc::now());
            assert!(v.is_zero());
        }
    }

    #[test]
    fn open_hand_centered_is_zero() {
        let v = translate_at(&gesture(GestureType::Open, 0.5, 0.5, 0.9), Utc::now());
        assert!(close(v.linear.x, 0.0));
        assert!(close(v.angular.z, 0.0));
    }

    #[test]
    fn open_hand_raised_and_right_drives_forward_and_turns() {
        let v = translate_at(&gesture(GestureType::Open, 0.75, 0.25, 0.9), Utc::now());
        assert!(close(v.linear.x, 0.5));
        assert!(close(v.angular.z, 0.5));
    }

    #[test]
    fn open_hand_out_of_frame_is_clamped() {
        let v = translate_at(&gesture(GestureType::Open, 2.0, -1.0, 0.9), Utc::now());
        assert!(close(v.linear.x, 1.0));
        assert!(close(v.angular.z, 1.0));
    }

    #[test]
    fn point_creeps_forward() {
        let v = translate_at(&gesture(GestureType::Point, 0.1, 0.9, 0.8), Utc::now());
        assert_eq!(
            v,
            VelocityVector {
                linear: Vector3::new(0.3, 0.0, 0.0),
                angular: Vector3::ZERO,
            }
        );
    }

    #[test]
    fn pinch_spins_within_amplitude_and_varies_with_time() {
        let t0 = DateTime::<Utc>::from_timestamp(1_000, 0).unwrap_or_default();
        let t1 = DateTime::<Utc>::from_timestamp(1_001, 0).unwrap_or_default();
        let a = translate_at(&gesture(GestureType::Pinch, 0.5, 0.5, 0.9), t0);
        let b = translate_at(&gesture(GestureType::Pinch, 0.5, 0.5, 0.9), t1);

        assert!(a.linear == Vector3::ZERO && b.linear == Vector3::ZERO);
        assert!(a.angular.z.abs() <= PINCH_SPIN_AMPLITUDE);
        assert!(close(a.angular.z, PINCH_SPIN_AMPLITUDE * 1_000f64.sin()));
        assert!(!close(a.angular.z, b.angular.z));
    }

    #[test]
    fn unknown_gesture_idles() {
        let v = translate_at(&gesture(GestureType::Unknown, 0.1, 0.1, 1.0), Utc::now());
        assert!(v.is_zero());
    }

    #[test]
    fn manual_passes_through() {
        let kind = CommandKind::Manual {
            linear: Vector3::new(0.7, 0.0, 0.0),
            angular: Vector3::new(0.0, 0.0, -0.4),
        };
        let v = translate_at(&kind, Utc::now());
        assert_eq!(v.linear, Vector3::new(0.7, 0.0, 0.0));
        assert_eq!(v.angular, Vector3::new(0.0, 0.0, -0.4));
    }

    #[test]
    fn stop_and_emergency_stop_are_zero() {
        assert!(translate(&Command::stop()).is_zero());
        assert!(translate(&Command::emergency_stop()).is_zero());
    }
}
