use core::fmt;
use turbo_routing_core::Coordinates;

/// Offset (in degrees, per axis) under which a cluster counts as central.
/// 0.02° is roughly 2 km at Buenos Aires latitudes.
pub const CENTER_THRESHOLD_DEG: f64 = 0.02;

/// Cardinal position of a zone relative to the depot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Centro,
    Norte,
    Sur,
    Este,
    Oeste,
}

impl Direction {
    /// Classifies `centroid` by its offset from `depot`. Within the threshold
    /// on both axes it is "Centro"; otherwise the axis with the larger offset
    /// decides.
    pub fn from_offset(centroid: Coordinates, depot: Coordinates) -> Self {
        let d_lat = centroid.lat - depot.lat;
        let d_lon = centroid.lon - depot.lon;

        if d_lat.abs() <= CENTER_THRESHOLD_DEG && d_lon.abs() <= CENTER_THRESHOLD_DEG {
            Self::Centro
        } else if d_lat.abs() >= d_lon.abs() {
            if d_lat > 0.0 { Self::Norte } else { Self::Sur }
        } else if d_lon > 0.0 {
            Self::Este
        } else {
            Self::Oeste
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Centro => "Centro",
            Self::Norte => "Norte",
            Self::Sur => "Sur",
            Self::Este => "Este",
            Self::Oeste => "Oeste",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display name of the `ordinal`-th zone (1-based).
pub fn zone_label(ordinal: usize, direction: Direction) -> String {
    format!("Zona {ordinal} - {direction}")
}

/// Short human description of a zone.
pub fn zone_description(member_count: usize, centroid: Coordinates) -> String {
    let noun = if member_count == 1 { "envío" } else { "envíos" };
    format!(
        "{member_count} {noun} alrededor de ({:.4}, {:.4})",
        centroid.lat, centroid.lon
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPOT: Coordinates = Coordinates::new(-34.6282, -58.4642);

    #[test]
    fn classifies_by_dominant_axis() {
        assert_eq!(Direction::from_offset(Coordinates::new(-34.60, -58.46), DEPOT), Direction::Norte);
        assert_eq!(Direction::from_offset(Coordinates::new(-34.70, -58.45), DEPOT), Direction::Sur);
        assert_eq!(Direction::from_offset(Coordinates::new(-34.63, -58.38), DEPOT), Direction::Este);
        assert_eq!(Direction::from_offset(Coordinates::new(-34.62, -58.52), DEPOT), Direction::Oeste);
    }

    #[test]
    fn near_depot_is_centro() {
        assert_eq!(Direction::from_offset(Coordinates::new(-34.62, -58.47), DEPOT), Direction::Centro);
        assert_eq!(Direction::from_offset(DEPOT, DEPOT), Direction::Centro);
    }

    #[test]
    fn formats_labels_and_descriptions() {
        assert_eq!(zone_label(2, Direction::Norte), "Zona 2 - Norte");
        assert_eq!(
            zone_description(1, Coordinates::new(-34.6, -58.46)),
            "1 envío alrededor de (-34.6000, -58.4600)"
        );
    }
}
