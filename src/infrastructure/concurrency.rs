/// Thread pool setup. Model construction fans out per file via rayon;
/// one core is left free for the build tool that invoked us.
use anyhow::Result;
use log::info;

pub fn init_thread_pool() -> Result<()> {
    let cores = num_cpus::get();
    let workers = std::cmp::max(1, cores - 1);

    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()?;

    info!("initialized thread pool: {workers} workers (system has {cores} cores)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_tolerable_when_called_twice() {
        // The global pool can only be built once per process; a second
        // call returns Err and that is fine for callers.
        let first = init_thread_pool();
        let second = init_thread_pool();
        assert!(first.is_ok() || second.is_err());
    }
}
