//! Hit command implementation - report which marker sits under each point

use anyhow::Result;
use markers_core::{MarkerRef, Point};
use serde::Serialize;
use std::path::PathBuf;

use super::{build_layer, CliLayer};
use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitRecord {
    pub x: f64,
    pub y: f64,
    pub marker: Option<HitMarker>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitMarker {
    pub id: u64,
    pub lat: f64,
    pub lng: f64,
    pub group: String,
    pub icon: Option<String>,
}

pub fn execute(config: &Config, markers: PathBuf, points: Vec<Point>) -> Result<Vec<HitRecord>> {
    log::info!("Probing {} points against {}", points.len(), markers.display());
    let layer = build_layer(config, &markers)?;

    let records: Vec<HitRecord> = points
        .into_iter()
        .map(|point| HitRecord {
            x: point.x,
            y: point.y,
            marker: layer.hit_test(point).map(|marker| describe(&layer, &marker)),
        })
        .collect();

    log::debug!(
        "{} of {} points hit a marker",
        records.iter().filter(|record| record.marker.is_some()).count(),
        records.len()
    );
    Ok(records)
}

fn describe(layer: &CliLayer, marker: &MarkerRef) -> HitMarker {
    let group = layer
        .store()
        .and_then(|store| store.registration(marker.id()))
        .map(|registration| registration.group.to_string())
        .unwrap_or_default();
    let position = marker.position();
    HitMarker {
        id: marker.id().get(),
        lat: position.lat,
        lng: position.lng,
        group,
        icon: marker.icon().map(|icon| icon.url.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markers_core::Crs;
    use tempfile::TempDir;

    #[test]
    fn test_hits_report_marker_and_group() -> Result<()> {
        let dir = TempDir::new()?;
        let markers = dir.path().join("markers.json");
        // Icons never load here; hit testing only needs their size
        std::fs::write(
            &markers,
            r#"[{"lat": 50, "lng": 50, "icon": {"url": "missing.png", "size": [20, 20]}, "group": "shops"}]"#,
        )?;

        let mut config = Config::default();
        config.view.crs = Crs::Simple;
        config.view.width = 100;
        config.view.height = 100;
        config.view.center_lat = 50.0;
        config.view.center_lng = 50.0;
        config.view.zoom = 0.0;

        let records = execute(&config, markers, vec![Point::new(55.0, 45.0), Point::new(5.0, 5.0)])?;
        assert_eq!(records.len(), 2);

        let hit = records[0].marker.as_ref().expect("center point should hit");
        assert_eq!((hit.lat, hit.lng), (50.0, 50.0));
        assert_eq!(hit.group, "shops");
        assert_eq!(hit.icon.as_deref(), Some("missing.png"));
        assert!(records[1].marker.is_none());

        let line = serde_json::to_string(&records[1])?;
        assert_eq!(line, r#"{"x":5.0,"y":5.0,"marker":null}"#);
        Ok(())
    }
}
