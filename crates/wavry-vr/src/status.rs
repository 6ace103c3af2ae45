use std::sync::{Mutex, MutexGuard, OnceLock};

const IDLE_STATUS: &str = "Driver: idle (no device activated)";

static DRIVER_STATUS: OnceLock<Mutex<String>> = OnceLock::new();

fn status_cell() -> MutexGuard<'static, String> {
    let cell = DRIVER_STATUS.get_or_init(|| Mutex::new(IDLE_STATUS.to_string()));
    match cell.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Human-readable status line of the most recent device transition.
pub fn driver_status() -> String {
    status_cell().clone()
}

pub fn set_driver_status(status: impl Into<String>) {
    *status_cell() = status.into();
}
