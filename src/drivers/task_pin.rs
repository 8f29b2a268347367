//! Core-pinned thread spawning for the ESP32 dual-core.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::spawn` creates a
//! FreeRTOS task pinned to a specific CPU core with explicit priority
//! and stack size. On non-ESP targets, falls back to plain thread spawn.
//!
//! # ESP-IDF Threading Model
//!
//! ESP-IDF implements `std::thread` via pthreads, which are thin wrappers
//! around FreeRTOS tasks. `esp_pthread_set_cfg()` sets thread-local
//! configuration that applies to the *next* `pthread_create()` call from
//! the calling thread. This means the config→spawn pair must not be
//! interleaved with other thread creation on the same thread.

/// CPU core identifiers for the ESP32 Xtensa dual-core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): protocol stacks (WiFi, lwIP) and link handling.
    Pro = 0,
    /// Core 1 (APP_CPU): session, monitor and indicator tasks.
    App = 1,
}

/// Scheduling parameters of one firmware task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// Null-terminated task name (e.g. `"session\0"`).
    pub name: &'static str,
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
}

impl TaskSpec {
    pub fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

/// Spawn a thread for `task`.
///
/// On ESP-IDF, uses `esp_pthread_set_cfg()` to configure core affinity,
/// priority, and stack size before `std::thread::spawn`.
///
/// On non-ESP targets, ignores `core` and `priority`, using only `stack_kb`.
#[cfg(target_os = "espidf")]
pub fn spawn_task(task: TaskSpec, f: impl FnOnce() + Send + 'static) -> std::thread::JoinHandle<()> {
    unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = task.core as i32;
        cfg.prio = task.priority as i32;
        cfg.stack_size = (task.stack_kb * 1024) as i32;
        cfg.thread_name = task.name.as_ptr() as *const _;
        let ret = esp_idf_sys::esp_pthread_set_cfg(&cfg);
        assert!(
            ret == esp_idf_sys::ESP_OK as i32,
            "esp_pthread_set_cfg failed: {ret}"
        );
    }

    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        task.display_name(),
        task.core,
        task.priority,
        task.stack_kb
    );

    std::thread::Builder::new()
        .name(task.display_name().into())
        .spawn(f)
        .expect("spawn_task: thread creation failed")
}

/// Simulation fallback, ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_task(task: TaskSpec, f: impl FnOnce() + Send + 'static) -> std::thread::JoinHandle<()> {
    log::info!(
        "Spawning '{}' (sim, no core pinning, stack={}KB)",
        task.display_name(),
        task.stack_kb
    );

    std::thread::Builder::new()
        .name(task.display_name().into())
        .stack_size(task.stack_kb * 1024)
        .spawn(f)
        .expect("spawn_task(sim): thread creation failed")
}
