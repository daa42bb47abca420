//! Build a small network from overlapping tracks, simplify it and export it.
//!
//! Run with: RUST_LOG=info cargo run --example build_network

use geonet::{Feature, GpsPoint, GraphStore, NetConfig, TrackMeta};

/// `steps + 1` evenly spaced points from `from` to `to`.
fn track(from: (f64, f64), to: (f64, f64), steps: usize) -> Vec<GpsPoint> {
    (0..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            GpsPoint::new(from.0 + (to.0 - from.0) * t, from.1 + (to.1 - from.1) * t)
        })
        .collect()
}

fn main() {
    env_logger::init();

    println!("Network Building Example\n");

    // Two rides along the Vltava that share the middle stretch (Prague)
    let mut north = track((50.060, 14.410), (50.080, 14.410), 20);
    north.extend(track((50.081, 14.411), (50.090, 14.420), 10));

    let mut south = track((50.070, 14.430), (50.070, 14.411), 15);
    south.extend(north[10..18].iter().copied());
    south.extend(track((50.078, 14.400), (50.080, 14.380), 15));

    let config = NetConfig {
        merge_edges: true,
        ..Default::default()
    };
    println!(
        "Config: match_max_distance={}m, simplify_min_distance={}m\n",
        config.match_max_distance, config.simplify_min_distance
    );

    let mut store = GraphStore::new(config);
    store.add_track(TrackMeta::titled("north"), &north).unwrap();
    store.add_track(TrackMeta::titled("south"), &south).unwrap();

    println!(
        "After ingestion: {} locations, {} edges",
        store.location_count(),
        store.edge_count()
    );

    store.simplify().unwrap();
    println!(
        "After simplification: {} locations, {} edges\n",
        store.location_count(),
        store.edge_count()
    );

    for feature in store.export().unwrap() {
        if let Feature::Line(line) = feature {
            println!(
                "   segment {:<20} {:>3} vertices, tracks {:?}",
                line.id,
                line.line.0.len(),
                line.tracks
            );
        }
    }

    println!("\n{}", store.stats());
}
