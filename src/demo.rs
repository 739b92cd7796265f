//! Synthetic workload for the demo driver
//!
//! Worker threads walk a shared list of shapes and run instrumented type checks
//! at three call sites with different degrees of pollution:
//!
//! | Site | Check | Types seen |
//! |------|-------|------------|
//! | `demo::render:1` | `is Circle` | all four shapes |
//! | `demo::layout:2` | `downcast Square` | squares and triangles |
//! | `demo::hit_test:3` | `is Circle` | circles only |

use std::thread;
use std::time::{Duration, Instant};

use crate::probe::Probe;
use crate::site::Observed;

pub struct Circle;
pub struct Square;
pub struct Triangle;
pub struct Hexagon;

fn shapes() -> Vec<Box<dyn Observed + Send + Sync>> {
    vec![
        Box::new(Circle),
        Box::new(Square),
        Box::new(Triangle),
        Box::new(Hexagon),
    ]
}

/// Run the workload on `threads` workers for `duration`
///
/// Returns the number of instrumented checks executed.
pub fn run(probe: &Probe, threads: usize, duration: Duration) -> u64 {
    let render = probe.site("demo::render", 1);
    let layout = probe.site("demo::layout", 2);
    let hit_test = probe.site("demo::hit_test", 3);
    let shapes = shapes();
    let deadline = Instant::now() + duration;

    thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|worker| {
                let (render, layout, hit_test, shapes) = (&render, &layout, &hit_test, &shapes);
                scope.spawn(move || {
                    let mut checks = 0u64;
                    let mut i = worker;
                    while Instant::now() < deadline {
                        let shape: &dyn Observed = &*shapes[i % shapes.len()];
                        let mut hits = 0u32;

                        if render.instance_of::<Circle>(shape) {
                            hits += 1;
                        }
                        checks += 1;

                        let layout_shape: &dyn Observed = &*shapes[1 + i % 2];
                        if layout.downcast_ref::<Square>(layout_shape).is_some() {
                            hits += 1;
                        }
                        checks += 1;

                        if hit_test.instance_of::<Circle>(&*shapes[0]) {
                            hits += 1;
                        }
                        checks += 1;

                        std::hint::black_box(hits);
                        i = i.wrapping_add(1);
                    }
                    checks
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|worker| worker.join().unwrap_or(0))
            .sum()
    })
}
