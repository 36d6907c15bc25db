//! Marker input files
//!
//! A marker file is a JSON array of records:
//!
//! ```json
//! [{"lat": 51.5, "lng": -0.12, "icon": {"url": "pin.png", "size": [24, 24]}, "group": "pubs"}]
//! ```

use crate::error::{CliError, CliResult};
use markers_core::{GroupId, Icon, LatLng, Marker, MarkerRef};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct MarkerRecord {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub icon: Option<Icon>,
    #[serde(default)]
    pub group: Option<String>,
}

impl MarkerRecord {
    pub fn into_marker(self) -> (GroupId, MarkerRef) {
        let position = LatLng::new(self.lat, self.lng);
        let marker = match self.icon {
            Some(icon) => Marker::new(position, icon),
            None => Marker::without_icon(position),
        };
        (self.group.map(GroupId::from).unwrap_or_default(), marker)
    }
}

/// Markers bucketed by group, groups in first-seen order.
pub type GroupedMarkers = Vec<(GroupId, Vec<MarkerRef>)>;

pub fn parse_markers(source: &str, content: &str) -> CliResult<GroupedMarkers> {
    let records: Vec<MarkerRecord> =
        serde_json::from_str(content).map_err(|err| CliError::parse(source, err.to_string()))?;

    let mut grouped: GroupedMarkers = Vec::new();
    for record in records {
        let (group, marker) = record.into_marker();
        match grouped.iter_mut().find(|(existing, _)| *existing == group) {
            Some((_, markers)) => markers.push(marker),
            None => grouped.push((group, vec![marker])),
        }
    }
    Ok(grouped)
}

pub fn load_markers(path: &Path) -> CliResult<GroupedMarkers> {
    if !path.exists() {
        return Err(CliError::file_not_found(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let grouped = parse_markers(&path.display().to_string(), &content)?;

    log::info!(
        "Read {} markers in {} groups from {}",
        grouped.iter().map(|(_, markers)| markers.len()).sum::<usize>(),
        grouped.len(),
        path.display()
    );
    Ok(grouped)
}
