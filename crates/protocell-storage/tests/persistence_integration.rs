use protocell_core::{Cell, Position, SimConfig, SnapshotStore, SubstanceDistribution, Tick, World};
use protocell_storage::{DirectoryStore, load_world_file, save_world_file, snapshot_file_name};
use std::fs;

fn small_config(save_period: u64) -> SimConfig {
    SimConfig {
        world_width: 16,
        world_height: 16,
        initial_cells: 0,
        organic_spawn_probability: 0.0,
        substance_distribution: SubstanceDistribution {
            organic: 4,
            toxin: 0,
            inorganic: 2,
        },
        auto_save: true,
        save_period,
        rng_seed: Some(99),
        ..SimConfig::default()
    }
}

fn seed_idle_cells(world: &mut World) {
    for x in [2.0, 6.0, 10.0] {
        world
            .environment_mut()
            .add_cell(Cell::new(Position::new(x, 8.0), Vec::new()));
    }
    world.environment_mut().promote_nursery();
}

#[test]
fn auto_saves_land_in_the_saves_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = DirectoryStore::open(dir.path().join("saves")).expect("store");
    let mut world = World::with_store(small_config(3), Box::new(store.clone())).expect("world");
    world.populate();
    seed_idle_cells(&mut world);
    for _ in 0..7 {
        world.update().expect("tick");
    }

    let saved = store.snapshots(world.identity()).expect("list");
    let ticks: Vec<Tick> = saved.iter().map(|(tick, _)| *tick).collect();
    assert_eq!(ticks, vec![Tick(3), Tick(6)]);
    let expected = store.snapshot_path(world.identity(), Tick(6));
    assert_eq!(saved[1].1, expected);
    assert!(
        expected
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name == snapshot_file_name(world.identity(), Tick(6)))
    );
}

#[test]
fn collapse_recovers_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = DirectoryStore::open(dir.path()).expect("store");
    let mut world = World::with_store(small_config(2), Box::new(store)).expect("world");
    seed_idle_cells(&mut world);
    for _ in 0..5 {
        world.update().expect("tick");
    }
    for cell in world.environment_mut().cells_mut() {
        cell.energy = 0.0;
    }

    let events = world.update().expect("collapse tick");
    assert_eq!(events.restored_from, Some(Tick(4)));
    assert_eq!(world.tick(), Tick(4));
    assert_eq!(world.environment().live_count(), 3);
}

#[test]
fn unreadable_latest_snapshot_falls_back_to_older_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = DirectoryStore::open(dir.path()).expect("store");
    let mut world = World::new(small_config(1_000)).expect("world");
    seed_idle_cells(&mut world);
    world.update().expect("tick");

    let identity = world.identity().to_owned();
    store
        .save(&identity, Tick(1), &world.to_snapshot())
        .expect("save");
    fs::write(store.snapshot_path(&identity, Tick(9)), b"{ not json").expect("corrupt");
    fs::write(dir.path().join("simulation_state_someone-else_50.json"), b"{}").expect("foreign");

    let latest = store.latest(&identity).expect("lookup").expect("snapshot");
    assert_eq!(latest.tick, Tick(1));
    assert!(store.latest("unknown-world").expect("lookup").is_none());
}

#[test]
fn explicit_world_files_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("world.json");
    let mut world = World::new(small_config(1_000)).expect("world");
    world.populate();
    seed_idle_cells(&mut world);
    for _ in 0..10 {
        world.update().expect("tick");
    }

    let snapshot = world.to_snapshot();
    save_world_file(&path, &snapshot).expect("save");
    let loaded = load_world_file(&path).expect("load");
    assert_eq!(loaded, snapshot);

    let restored =
        World::from_snapshot(loaded, small_config(1_000), Box::new(protocell_core::NullStore))
            .expect("restore");
    assert_eq!(restored.tick(), world.tick());
    assert_eq!(restored.identity(), world.identity());
    assert!(load_world_file(&dir.path().join("missing.json")).is_err());
}
