//! Simulated slurry run: load at the pit, spread on two fields, finish.
//!
//! Run with: cargo run --example simulated_drive

use field_tracker::{
    build_segments, estimate_field_amounts, ActivityType, FertilizerType, Field, FieldKind,
    GeoPoint, ManualLocationSource, MemoryFarm, RecordingSink, StorageLocation, Tracker,
    TrackerSettings,
};

fn square(id: &str, name: &str, lat: f64, lng: f64, size_deg: f64) -> Field {
    Field::new(
        id,
        name,
        FieldKind::Acker,
        vec![
            GeoPoint::new(lat, lng),
            GeoPoint::new(lat, lng + size_deg),
            GeoPoint::new(lat + size_deg, lng + size_deg),
            GeoPoint::new(lat + size_deg, lng),
        ],
    )
}

fn main() {
    let fields = vec![
        square("f-north", "Nordacker", 52.002, 8.000, 0.002),
        square("f-east", "Ostweide", 52.002, 8.004, 0.002),
    ];
    let mut pit = StorageLocation::new("pit-1", "Güllegrube Hof", FertilizerType::Slurry, GeoPoint::new(52.000, 8.003));
    pit.capacity = 800.0;
    pit.current_level = 420.0;

    let farm = MemoryFarm::new(fields.clone(), vec![pit.clone()], TrackerSettings::default());
    let mut tracker = Tracker::new(
        Box::new(ManualLocationSource::default()),
        Box::new(RecordingSink::default()),
    );
    tracker.set_test_mode(true);

    let slurry = ActivityType::Fertilization { fertilizer: FertilizerType::Slurry };
    tracker.start(slurry, &farm, 0).expect("start session");

    let mut t = 0u64;
    let mut drag = |tracker: &mut Tracker, lat: f64, lng: f64| {
        t += 1_000;
        if let Ok(Some(outcome)) = tracker.simulate_move(lat, lng, t) {
            for warning in &outcome.warnings {
                println!("   warning: {:?}", warning);
            }
            if let Some(storage) = &outcome.load_registered {
                println!("   load registered from {}", storage);
            }
        }
    };

    println!("Simulated drive\n");

    // Two loads, each spread on a different field
    for (field_lng, label) in [(8.0005, "Nordacker"), (8.0045, "Ostweide")] {
        println!("-> to the pit");
        drag(&mut tracker, 52.0000, 8.0030);
        drag(&mut tracker, 52.0000, 8.0030);
        println!("   state: {:?}", tracker.state());

        println!("-> spreading on {}", label);
        drag(&mut tracker, 52.0025, field_lng);
        for i in 1..=20 {
            drag(&mut tracker, 52.0025 + i as f64 * 0.00002, field_lng);
        }
        println!("   state: {:?}", tracker.state());
    }

    if let Some(stats) = tracker.stats(t) {
        println!(
            "\nStats: {:.0}m driven, {:.0}m spreading, {} points, {} loads",
            stats.distance_m, stats.working_distance_m, stats.point_count, stats.total_loads
        );
    }

    let record = tracker.finish(Some("Demo".to_string()), t).expect("finish session");
    println!("\nRecord {} ({})", record.id, record.date);
    println!("  amount: {:.1} {}", record.amount, record.unit);
    for (field_id, amount) in estimate_field_amounts(&record, &fields) {
        println!("  {}: {:.1} {}", field_id, amount, record.unit);
    }

    let segments = build_segments(&record.track_points, &[pit], &slurry);
    println!("\n{} segments:", segments.len());
    for segment in &segments {
        println!(
            "  {} {} ({} points)",
            segment.color,
            if segment.is_spreading { "spreading" } else { "transit" },
            segment.points.len()
        );
    }
}
