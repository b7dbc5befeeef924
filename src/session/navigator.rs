//! Router collaborator

/// Something that can move the user to another screen
pub trait Navigator: Send + Sync {
    fn navigate_to(&self, path: &str);
}

/// Navigator for headless front ends: records the route in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate_to(&self, path: &str) {
        log::info!("Navigating to {}", path);
    }
}

/// Remembers every navigation, for assertions
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    paths: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingNavigator {
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Navigator for RecordingNavigator {
    fn navigate_to(&self, path: &str) {
        self.paths.lock().unwrap().push(path.to_string());
    }
}
