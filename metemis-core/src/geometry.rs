//! Stockpile geometry for the erosion schemes.
//!
//! A source is either an asymmetric trapezoidal prism (described by its
//! major and minor sides, orientation angle and height) or a cone
//! (radius and height). Classification picks exactly one of the two from
//! the configured parameters and computes the exposed surface area used
//! by the emission formulas.

use log::debug;

use crate::config::SourceConfig;
use crate::errors::{MetemisError, MetemisResult};

/// Classified stockpile shape with its precomputed exposed surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stockpile {
    Asymmetric {
        major: f64,
        minor: f64,
        angle: f64,
        height: f64,
        surface: f64,
    },
    Conical {
        radius: f64,
        height: f64,
        surface: f64,
    },
}

impl Stockpile {
    /// Classify the geometry of a source from its raw configuration.
    ///
    /// Exactly one of the two parameter sets must be fully present:
    /// {major, minor, angle, height} or {radius, height}. The asymmetric
    /// set additionally requires `|angle| <= 90`, `major > minor` and a
    /// lateral slope within 45 degrees.
    pub fn classify(id: &str, cfg: &SourceConfig) -> MetemisResult<Self> {
        let asymmetric = matches!(
            (cfg.major, cfg.minor, cfg.angle, cfg.height),
            (Some(_), Some(_), Some(_), Some(_))
        );
        let conical = matches!((cfg.radius, cfg.height), (Some(_), Some(_)));
        if asymmetric == conical {
            return Err(MetemisError::UndefinedShape {
                source_id: id.to_string(),
            });
        }

        if asymmetric {
            let (major, minor, angle, height) = (
                cfg.major.unwrap_or_default(),
                cfg.minor.unwrap_or_default(),
                cfg.angle.unwrap_or_default(),
                cfg.height.unwrap_or_default(),
            );
            if angle.abs() > 90.0 {
                return Err(MetemisError::InvalidAngle {
                    source_id: id.to_string(),
                    angle,
                });
            }
            if major <= minor {
                return Err(MetemisError::MajorNotAboveMinor {
                    source_id: id.to_string(),
                    major,
                    minor,
                });
            }
            let surface = asymmetric_surface(id, major, minor, height)?;
            debug!("source {id} has asymmetric shape, surface {surface:.2} m2");
            Ok(Stockpile::Asymmetric {
                major,
                minor,
                angle,
                height,
                surface,
            })
        } else {
            let (radius, height) = (cfg.radius.unwrap_or_default(), cfg.height.unwrap_or_default());
            let surface = conical_surface(radius, height);
            debug!("source {id} has conical shape, surface {surface:.2} m2");
            Ok(Stockpile::Conical {
                radius,
                height,
                surface,
            })
        }
    }

    pub fn surface(&self) -> f64 {
        match self {
            Stockpile::Asymmetric { surface, .. } | Stockpile::Conical { surface, .. } => *surface,
        }
    }

    /// Width of the pile transverse to the wind: the minor side for the
    /// asymmetric shape, the diameter for the cone.
    pub fn base(&self) -> f64 {
        match self {
            Stockpile::Asymmetric { minor, .. } => *minor,
            Stockpile::Conical { radius, .. } => 2.0 * radius,
        }
    }

    pub fn height(&self) -> f64 {
        match self {
            Stockpile::Asymmetric { height, .. } | Stockpile::Conical { height, .. } => *height,
        }
    }

    /// EPA surface-fraction weights of the four control sectors for one
    /// wind direction.
    ///
    /// The cone is symmetric, so a single row applies whatever the wind.
    /// The asymmetric pile folds the wind incidence on its orientation
    /// into [0, 90] and picks the row for that exposure class.
    pub fn sector_weights(&self, wd: f64) -> [f64; 4] {
        match self {
            Stockpile::Conical { .. } => [40.0, 48.0, 12.0, 0.0],
            Stockpile::Asymmetric { angle, .. } => {
                let incidence = if *angle < 0.0 {
                    wd - (-90.0 - angle)
                } else {
                    wd - (90.0 - angle)
                };
                let alpha = incidence_to_sector_angle(incidence);
                if alpha <= 20.0 {
                    [36.0, 50.0, 14.0, 0.0]
                } else if alpha <= 40.0 {
                    [31.0, 51.0, 15.0, 3.0]
                } else {
                    [28.0, 54.0, 14.0, 4.0]
                }
            }
        }
    }
}

/// Lateral surface of a conical pile.
pub fn conical_surface(radius: f64, height: f64) -> f64 {
    std::f64::consts::PI * radius * (radius.powi(2) + height.powi(2)).sqrt()
}

/// Exposed surface of the trapezoidal prism.
///
/// Fails when the height reaches half the minor side, which would push
/// the lateral slope beyond 45 degrees.
fn asymmetric_surface(id: &str, major: f64, minor: f64, height: f64) -> MetemisResult<f64> {
    let limit = minor / 2.0;
    if height >= limit {
        return Err(MetemisError::SlopeTooSteep {
            source_id: id.to_string(),
            height,
            limit,
        });
    }
    let top = limit - height;
    let slope = (height / ((minor - top) / 2.0)).atan().to_degrees();
    debug!("trapezoidal top side is {top:.1} m, lateral slope {slope:.1} degrees");
    let oblique = (height.powi(2) + ((minor - height) / 2.0).powi(2)).sqrt();
    Ok(height * (minor + top) + (2.0 * oblique + top) * major)
}

/// Fold a wind incidence angle into the [0, 90] exposure range.
///
/// One periodic fold at 0/360, then reflection around the quadrant
/// boundaries.
fn incidence_to_sector_angle(incidence: f64) -> f64 {
    let mut inc = incidence;
    if inc > 360.0 {
        inc -= 360.0;
    }
    if inc < 0.0 {
        inc += 360.0;
    }
    if inc >= 270.0 {
        inc - 270.0
    } else if inc > 180.0 {
        270.0 - inc
    } else if inc > 90.0 {
        inc - 90.0
    } else {
        90.0 - inc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn raw(cfg: fn(&mut SourceConfig)) -> SourceConfig {
        let mut source = SourceConfig::for_tests("1", 2, &["PM25", "PM10", "PTS"]);
        cfg(&mut source);
        source
    }

    #[test]
    fn test_conical_surface() {
        // pi * 3 * sqrt(9 + 16) = 15 pi
        assert!(is_close!(
            conical_surface(3.0, 4.0),
            15.0 * std::f64::consts::PI
        ));
    }

    #[test]
    fn test_asymmetric_surface() {
        // major 20, minor 10, height 2: top = 3, oblique = sqrt(4 + 16)
        let s = asymmetric_surface("1", 20.0, 10.0, 2.0).unwrap();
        let oblique = 20.0_f64.sqrt();
        assert!(is_close!(s, 2.0 * 13.0 + (2.0 * oblique + 3.0) * 20.0));
    }

    #[test]
    fn test_slope_over_45_degrees() {
        let err = asymmetric_surface("1", 20.0, 10.0, 5.0).unwrap_err();
        assert!(matches!(err, MetemisError::SlopeTooSteep { .. }));
    }

    #[test]
    fn test_classify_requires_exactly_one_shape() {
        let none = raw(|s| {
            s.height = Some(2.0);
        });
        assert!(matches!(
            Stockpile::classify("1", &none).unwrap_err(),
            MetemisError::UndefinedShape { .. }
        ));

        let both = raw(|s| {
            s.major = Some(20.0);
            s.minor = Some(10.0);
            s.angle = Some(0.0);
            s.height = Some(2.0);
            s.radius = Some(5.0);
        });
        assert!(matches!(
            Stockpile::classify("1", &both).unwrap_err(),
            MetemisError::UndefinedShape { .. }
        ));
    }

    #[test]
    fn test_classify_rejects_major_not_above_minor() {
        let source = raw(|s| {
            s.major = Some(10.0);
            s.minor = Some(10.0);
            s.angle = Some(0.0);
            s.height = Some(2.0);
        });
        assert!(matches!(
            Stockpile::classify("1", &source).unwrap_err(),
            MetemisError::MajorNotAboveMinor { .. }
        ));
    }

    #[test]
    fn test_classify_rejects_angle_out_of_range() {
        let source = raw(|s| {
            s.major = Some(20.0);
            s.minor = Some(10.0);
            s.angle = Some(120.0);
            s.height = Some(2.0);
        });
        assert!(matches!(
            Stockpile::classify("1", &source).unwrap_err(),
            MetemisError::InvalidAngle { .. }
        ));
    }

    #[test]
    fn test_incidence_fold() {
        assert!(is_close!(incidence_to_sector_angle(0.0), 90.0));
        assert!(is_close!(incidence_to_sector_angle(90.0), 0.0));
        assert!(is_close!(incidence_to_sector_angle(135.0), 45.0));
        assert!(is_close!(incidence_to_sector_angle(180.0), 90.0));
        assert!(is_close!(incidence_to_sector_angle(225.0), 45.0));
        assert!(is_close!(incidence_to_sector_angle(270.0), 0.0));
        assert!(is_close!(incidence_to_sector_angle(315.0), 45.0));
        assert!(is_close!(incidence_to_sector_angle(405.0), 45.0));
        assert!(is_close!(incidence_to_sector_angle(-45.0), 45.0));
    }

    #[test]
    fn test_sector_weights() {
        let cone = Stockpile::Conical {
            radius: 5.0,
            height: 2.0,
            surface: 1.0,
        };
        assert_eq!(cone.sector_weights(0.0), cone.sector_weights(213.0));

        let pile = Stockpile::Asymmetric {
            major: 20.0,
            minor: 10.0,
            angle: 0.0,
            height: 2.0,
            surface: 1.0,
        };
        // incidence folds to 0, 35 and 80 degrees respectively
        assert_eq!(pile.sector_weights(0.0), [36.0, 50.0, 14.0, 0.0]);
        assert_eq!(pile.sector_weights(145.0), [31.0, 51.0, 15.0, 3.0]);
        assert_eq!(pile.sector_weights(100.0), [28.0, 54.0, 14.0, 4.0]);
    }

    #[test]
    fn test_sector_weights_negative_orientation() {
        let pile = Stockpile::Asymmetric {
            major: 20.0,
            minor: 10.0,
            angle: -30.0,
            height: 2.0,
            surface: 1.0,
        };
        // the incidence origin flips to -90 - angle = -60: wd = 0 gives
        // an incidence of 60 folding to 30 degrees
        assert_eq!(pile.sector_weights(0.0), [31.0, 51.0, 15.0, 3.0]);
        // wd = 30 meets the pile head on, incidence 90 folding to 0
        assert_eq!(pile.sector_weights(30.0), [36.0, 50.0, 14.0, 0.0]);
        // wd = 150, incidence 210, folds to 60 degrees
        assert_eq!(pile.sector_weights(150.0), [28.0, 54.0, 14.0, 4.0]);
    }
}
