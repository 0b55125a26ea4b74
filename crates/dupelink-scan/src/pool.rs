//! Fixed-width worker pool with a blocking hand-off.

use crossbeam_channel::Sender;
use rayon::{ThreadPoolBuildError, ThreadPoolBuilder};

/// Run `workers` long-lived workers that apply `process` to every job the
/// producer sends.
///
/// The channel has no buffer, so a send blocks until a worker is free to
/// take the job. `produce` runs on the calling thread; this returns once
/// it has finished and every job it sent has been processed.
pub(crate) fn run_bounded<T, P, F>(
    workers: usize,
    produce: P,
    process: F,
) -> Result<(), ThreadPoolBuildError>
where
    T: Send,
    P: FnOnce(&Sender<T>),
    F: Fn(T) + Sync,
{
    let workers = workers.max(1);
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("dupelink-worker-{i}"))
        .build()?;

    let (tx, rx) = crossbeam_channel::bounded::<T>(0);
    let process = &process;

    pool.in_place_scope(move |scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            scope.spawn(move |_| {
                for job in rx.iter() {
                    process(job);
                }
            });
        }
        drop(rx);

        produce(&tx);
        drop(tx);
    });

    Ok(())
}
