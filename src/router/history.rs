/// Visited locations, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: Vec<String>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed location. `replace` overwrites the newest entry
    /// instead of pushing (an empty history always pushes).
    pub fn commit(&mut self, location: &str, replace: bool) {
        match self.entries.last_mut() {
            Some(last) if replace => *last = location.to_string(),
            _ => self.entries.push(location.to_string()),
        }
    }

    /// Pop twice and return the second entry popped, or `root` when the
    /// history is too short. The caller navigates there, which pushes it
    /// back.
    pub fn back_target(&mut self, root: &str) -> String {
        self.entries.pop();
        self.entries.pop().unwrap_or_else(|| root.to_string())
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
