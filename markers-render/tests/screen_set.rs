mod common;

use common::*;
use markers_core::*;
use markers_render::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn screen_index_matches_padded_viewport(
        positions in prop::collection::vec((-60.0f64..160.0, -60.0f64..160.0), 0..80),
        pan in (-40i32..40, -40i32..40),
        padding in 0.0f64..0.5,
    ) {
        let mut layer = mounted_layer(LayerOptions::default().with_padding(padding));
        let markers: Vec<MarkerRef> = positions.iter().map(|&(x, y)| pin_at(x, y)).collect();
        layer.add_many(markers.clone(), "0");

        layer.view_mut().unwrap().pan_by(Point::new(pan.0 as f64, pan.1 as f64));
        layer.on_view_change(ViewEvent::MoveEnd);
        prop_assert!(layer.on_frame());

        let padded = layer.view().unwrap().bounds().pad(padding);
        let expected: BTreeSet<MarkerId> = markers
            .iter()
            .filter(|marker| padded.contains(marker.position()))
            .map(|marker| marker.id())
            .collect();
        let actual: BTreeSet<MarkerId> = layer
            .store()
            .unwrap()
            .screen_entries()
            .iter()
            .map(|entry| entry.data.id())
            .collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn hits_inside_a_lone_icon_find_it(
        x in 10.0f64..90.0,
        y in 10.0f64..90.0,
        dx in -9.9f64..9.9,
        dy in -9.9f64..9.9,
    ) {
        let mut layer = mounted_layer(LayerOptions::default());
        let marker = pin_at(x, y);
        layer.add(marker.clone(), "0").unwrap();

        let inside = Point::new(x + dx, y + dy);
        prop_assert_eq!(layer.hit_test(inside).map(|m| m.id()), Some(marker.id()));
        let outside = Point::new(x + 10.5, y + dy);
        prop_assert!(layer.hit_test(outside).is_none());
    }
}
