//! Loop/trim policy shared by the visual track and the music bed.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("available duration must be positive, got {0}")]
    NoMaterial(f64),
    #[error("required duration must be positive, got {0}")]
    NothingRequired(f64),
}

/// How to stretch or shorten a timeline so it lands on `trim_to` exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciliation {
    /// Total plays of the whole timeline, the first one included.
    pub loop_count: u32,
    /// Cut point measured from the start of the looped timeline.
    pub trim_to: f64,
}

impl Reconciliation {
    pub fn needs_loop(&self) -> bool {
        self.loop_count > 1
    }

    /// Extra repetitions after the first play (ffmpeg `-stream_loop` value).
    pub fn extra_loops(&self) -> u32 {
        self.loop_count.saturating_sub(1)
    }
}

pub fn reconcile(available: f64, required: f64) -> Result<Reconciliation, ReconcileError> {
    if !(available.is_finite() && available > 0.0) {
        return Err(ReconcileError::NoMaterial(available));
    }
    if !(required.is_finite() && required > 0.0) {
        return Err(ReconcileError::NothingRequired(required));
    }

    if available >= required {
        return Ok(Reconciliation {
            loop_count: 1,
            trim_to: required,
        });
    }

    let mut loop_count = (required / available).ceil() as u32;
    // float division can land a hair under the true quotient
    while (loop_count as f64) * available < required {
        loop_count += 1;
    }

    Ok(Reconciliation {
        loop_count,
        trim_to: required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_material_loops_to_ceiling() {
        let r = reconcile(60.0, 300.0).unwrap();
        assert_eq!(r.loop_count, 5);
        assert_eq!(r.trim_to, 300.0);
        assert_eq!(r.extra_loops(), 4);

        let r = reconcile(70.0, 300.0).unwrap();
        assert_eq!(r.loop_count, 5);
        assert!(r.loop_count as f64 * 70.0 >= 300.0);
    }

    #[test]
    fn long_material_is_trimmed_never_padded() {
        let r = reconcile(412.5, 300.0).unwrap();
        assert_eq!(r.loop_count, 1);
        assert!(!r.needs_loop());
        assert_eq!(r.trim_to, 300.0);

        let r = reconcile(300.0, 300.0).unwrap();
        assert_eq!(r.loop_count, 1);
    }

    #[test]
    fn loop_count_always_covers_required() {
        for available in [0.1, 0.3, 0.7, 1.1, 7.77, 13.0, 59.999] {
            for required in [0.7, 2.1, 49.0, 300.0, 301.3] {
                let r = reconcile(available, required).unwrap();
                assert!(r.loop_count as f64 * available >= required);
                assert_eq!(r.trim_to, required);
                if available >= required {
                    assert_eq!(r.loop_count, 1);
                }
            }
        }
    }

    #[test]
    fn zero_material_is_a_precondition_failure() {
        assert_eq!(reconcile(0.0, 10.0), Err(ReconcileError::NoMaterial(0.0)));
        assert!(reconcile(f64::NAN, 10.0).is_err());
        assert!(matches!(
            reconcile(5.0, 0.0),
            Err(ReconcileError::NothingRequired(_))
        ));
    }
}
