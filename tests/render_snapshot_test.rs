//! Draw list snapshot tests
//!
//! Composition is a pure function of viewport, cached data, annotations,
//! events and selection, so equal inputs must serialize to equal bytes.

mod common;

use common::builders::{events, test_config, SourceBuilder};
use common::settle;
use std::sync::Arc;
use tracevis_rs::annotations::ChannelScope;
use tracevis_rs::config::{ViewSettings, ViewerConfig};
use tracevis_rs::interaction::{InputEvent, Key};
use tracevis_rs::render::{Layer, Primitive, RectKind, TickKind};
use tracevis_rs::source::MemorySource;
use tracevis_rs::viewer::Viewer;

fn source() -> Arc<MemorySource> {
    SourceBuilder::new(6)
        .samples(20_000)
        .bad(1)
        .memory(|c, i| (((i * (c + 3)) % 17) as f32 - 8.0) * 1e-6)
}

fn scripted_viewer() -> Viewer {
    let mut viewer = Viewer::new(
        source(),
        events(&[(3.0, 1), (12.5, 2), (40.0, 5)]),
        test_config(),
    )
    .unwrap();
    viewer.resize(880.0, 300.0);
    viewer.resize_overview(800.0, 40.0);
    viewer
        .annotations_mut()
        .create(2.0, 1.5, "bad_blink", ChannelScope::All);
    viewer
        .annotations_mut()
        .create(6.0, 0.5, "bad_jump", ChannelScope::Subset([2].into()));
    viewer.handle_input(InputEvent::key(Key::Right));
    viewer
}

#[test]
fn test_identical_inputs_give_identical_bytes() {
    let mut a = scripted_viewer();
    let mut b = scripted_viewer();
    let frame_a = settle(&mut a);
    let frame_b = settle(&mut b);

    assert_eq!(frame_a.main.to_json_bytes().unwrap(), frame_b.main.to_json_bytes().unwrap());
    assert_eq!(
        frame_a.overview.to_json_bytes().unwrap(),
        frame_b.overview.to_json_bytes().unwrap()
    );

    // Recomposing an unchanged state is stable too
    let again = a.frame();
    assert_eq!(again.main, frame_a.main);
}

#[test]
fn test_snapshot_contents() {
    let mut viewer = scripted_viewer();
    let frame = settle(&mut viewer);
    let list = &frame.main;

    let layers: Vec<Layer> = list.items().iter().map(|item| item.layer).collect();
    assert!(layers.windows(2).all(|w| w[0] <= w[1]));

    assert_eq!(
        list.layer(Layer::Traces)
            .filter(|p| matches!(p, Primitive::Polyline { .. }))
            .count(),
        4
    );
    // View is 2.5..12.5 s: one blink region on every row, the jump only on channel 2
    let annotations = list
        .layer(Layer::Annotations)
        .filter(|p| matches!(p, Primitive::FilledRect { kind: RectKind::Annotation(_), .. }))
        .count();
    assert_eq!(annotations, 2);
    let events: Vec<i32> = list
        .layer(Layer::Events)
        .filter_map(|p| match p {
            Primitive::Tick {
                kind: TickKind::Event { code },
                ..
            } => Some(*code),
            _ => None,
        })
        .collect();
    assert_eq!(events, vec![1, 2]);
    assert!(list.layer(Layer::BadChannels).any(|p| matches!(
        p,
        Primitive::FilledRect {
            kind: RectKind::BadChannel { channel: 1, .. },
            ..
        }
    )));

    let json: serde_json::Value = serde_json::from_slice(&list.to_json_bytes().unwrap()).unwrap();
    assert_eq!(json["items"].as_array().unwrap().len(), list.len());
}

#[test]
fn test_dense_dataset_shows_elision_indicator() {
    let config = ViewerConfig {
        view: ViewSettings {
            initial_channels: 200,
            ..ViewSettings::default()
        },
        ..test_config()
    };
    let source = SourceBuilder::new(200).samples(2_000).memory(|_, _| 0.0);
    let mut viewer = Viewer::new(source, events(&[]), config).unwrap();
    viewer.resize(880.0, 400.0);

    let frame = settle(&mut viewer);
    // 10 px rows for a dense dataset: 39 rows and the indicator slot,
    // after the EEG scalebar
    let labels: Vec<&str> = frame
        .main
        .layer(Layer::Labels)
        .filter_map(|p| match p {
            Primitive::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(labels, vec!["40 µV", "161 more channels"]);
    assert_eq!(
        frame
            .main
            .layer(Layer::Traces)
            .filter(|p| matches!(p, Primitive::Polyline { .. }))
            .count(),
        39
    );
}
