use colony_nav::config::{NavConfig, DEFAULT_CONFIG_PATH};
use colony_nav::fixed_math::FixedNum;
use colony_nav::pathfinding::{Cell, Enterability, Navigator, Path, PathError, PathStatus, Walker};
use colony_nav::profile_log;
use colony_nav::structures::{TileObject, WalkabilityGrid};
use crossbeam_channel::{Receiver, Sender};
use rand::Rng;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const TICKS: u64 = 2_000;
const AGENTS: usize = 24;
const EDIT_INTERVAL: u64 = 15;

const COLONY: &[&str] = &[
    "........................................",
    "..##########..........#########.........",
    "..#........#..........#.......#.........",
    "..#........D..........D.......#....XX...",
    "..#........#..........#.......#....XX...",
    "..####D#####..........###D#####.........",
    "........................................",
    "......~~~~~~..................XXXX......",
    "......~~~~~~..................XXXX......",
    "........................................",
    "..#######D#######......#######D#######..",
    "..#.............#......#.............#..",
    "..#.............#......#.............#..",
    "..###############......###############..",
    "........................................",
];

fn setup_file_logging() -> Result<String, Box<dyn Error>> {
    let log_dir = PathBuf::from("logs");
    fs::create_dir_all(&log_dir)?;
    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("colony_nav_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_path = log_dir.join(&log_filename).to_string_lossy().to_string();

    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);
    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("colony_nav=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    Ok(log_path)
}

fn cleanup_old_logs(log_dir: &PathBuf, keep_count: usize) {
    let Ok(entries) = fs::read_dir(log_dir) else { return };
    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|s| s.starts_with("colony_nav") && s.ends_with(".log"))
                .unwrap_or(false)
        })
        .collect();

    // Oldest first
    log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

    if log_files.len() > keep_count {
        for file in log_files.iter().take(log_files.len() - keep_count) {
            let _ = fs::remove_file(file.path());
        }
    }
}

struct SimTick(u64);

struct Agent {
    position: Cell,
    walker: Walker,
    path: Option<Path>,
    waiting: bool,
    arrivals: u32,
}

type Delivery = (usize, Result<Path, PathError>);

fn random_open_cell(grid: &WalkabilityGrid, rng: &mut impl Rng) -> Option<Cell> {
    (0..32)
        .map(|_| Cell::new(rng.random_range(0..grid.width()), rng.random_range(0..grid.height())))
        .find(|&c| grid.classify(c) == Enterability::Immediate)
}

fn request(nav: &mut Navigator, index: usize, agent: &mut Agent, goal: Cell, tx: &Sender<Delivery>) {
    let tx = tx.clone();
    let status = nav.request_path(agent.position, goal, agent.walker, move |result| {
        let _ = tx.send((index, result));
    });
    agent.waiting = true;
    if !status.is_queued() {
        info!("[PATHFINDING] Agent {} request {:?}", index, status);
    }
}

fn random_edit(nav: &mut Navigator, rng: &mut impl Rng) {
    let Some(cell) = random_open_cell(nav.grid(), rng) else { return };
    let result = match rng.random_range(0..10) {
        0..=4 => nav.on_object_placed(cell, TileObject::Wall, &[]),
        5..=6 => nav.on_object_placed(cell, TileObject::Door, &[]),
        _ => {
            // Clear whatever object sits on a random cell.
            let target = Cell::new(rng.random_range(0..nav.grid().width()), rng.random_range(0..nav.grid().height()));
            if nav.grid().object(target).is_none() {
                return;
            }
            nav.on_object_removed(target, &[])
        }
    };
    match result {
        Ok(report) if !report.is_noop() => info!(
            "[PATHFINDING] Edit at {}: {} created, {} destroyed, {} paths invalidated",
            cell,
            report.regions.created.len(),
            report.regions.destroyed.len(),
            report.invalidated_paths
        ),
        Ok(_) => {}
        Err(err) => warn!("[PATHFINDING] Edit rejected: {}", err),
    }
}

fn deliver(agents: &mut [Agent], rx: &Receiver<Delivery>) {
    while let Ok((index, result)) = rx.try_recv() {
        let Some(agent) = agents.get_mut(index) else { continue };
        agent.waiting = false;
        agent.path = result.ok();
    }
}

fn step_agents(nav: &mut Navigator, agents: &mut [Agent], rng: &mut impl Rng, tx: &Sender<Delivery>) {
    for index in 0..agents.len() {
        let agent = &mut agents[index];
        if agent.waiting {
            continue;
        }
        match agent.path.as_ref().map(Path::status) {
            Some(PathStatus::Following) => {
                if let Some(path) = agent.path.as_mut() {
                    if let Some(next) = path.current() {
                        agent.position = next;
                    }
                    path.advance();
                }
            }
            Some(PathStatus::Arrived) => {
                agent.arrivals += 1;
                agent.path = None;
            }
            Some(PathStatus::Invalid) | None => {
                agent.path = None;
                if !nav.grid().classify(agent.position).is_passable() {
                    // Walled in where it stood.
                    match random_open_cell(nav.grid(), rng) {
                        Some(cell) => agent.position = cell,
                        None => continue,
                    }
                }
                if let Some(goal) = random_open_cell(nav.grid(), rng) {
                    request(nav, index, agent, goal, tx);
                }
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let log_file = setup_file_logging()?;
    println!("colony_nav demo, logging to {}", log_file);

    let config = NavConfig::load_or_default(DEFAULT_CONFIG_PATH);
    let mut nav = Navigator::new(WalkabilityGrid::from_rows(COLONY), config);
    let mut rng = rand::rng();
    let (tx, rx) = crossbeam_channel::unbounded::<Delivery>();

    let mut agents: Vec<Agent> = (0..AGENTS)
        .filter_map(|i| {
            let position = random_open_cell(nav.grid(), &mut rng)?;
            let walker = if i % 4 == 0 {
                Walker::without_doors()
            } else {
                Walker {
                    speed: FixedNum::from_num(rng.random_range(0.5f64..1.5)),
                    ..Walker::default()
                }
            };
            Some(Agent { position, walker, path: None, waiting: false, arrivals: 0 })
        })
        .collect();

    for tick in 0..TICKS {
        let tick = SimTick(tick);
        if tick.0 > 0 && tick.0 % EDIT_INTERVAL == 0 {
            random_edit(&mut nav, &mut rng);
        }

        nav.pump();
        deliver(&mut agents, &rx);
        step_agents(&mut nav, &mut agents, &mut rng, &tx);

        profile_log!(
            tick,
            "[PERF] tick {}: {} pending, {} regions",
            tick.0,
            nav.pending_request_count(),
            nav.regions().region_count()
        );
    }

    if !nav.wait_idle(Duration::from_secs(5)) {
        warn!("[PATHFINDING] Worker pool still busy at shutdown");
    }
    nav.pump();
    deliver(&mut agents, &rx);

    let stats = nav.stats();
    let arrivals: u32 = agents.iter().map(|a| a.arrivals).sum();
    info!(
        "[PATHFINDING] Done after {} ticks (v{}): {} arrivals, {} delivered, {} rejected, {} failed, {} invalidated, {} stale",
        TICKS,
        nav.version(),
        arrivals,
        stats.delivered,
        stats.rejected,
        stats.failed,
        stats.invalidated,
        stats.stale_deliveries
    );
    info!(
        "[REGIONS] {} regions in {} islands",
        nav.regions().region_count(),
        nav.regions().island_count()
    );
    Ok(())
}
