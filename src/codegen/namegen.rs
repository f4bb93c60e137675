use crate::utils::ascii_name;

/// Produces fresh C identifiers for temporaries, guards, and index tables.
///
/// Generated names start with an underscore, which [crate::utils::c_name] never produces for
/// a leading character, so they cannot collide with names taken from the IR.
pub struct NameGenerator {
    names_generated: usize,
}

impl NameGenerator {
    pub fn new() -> Self {
        NameGenerator { names_generated: 0 }
    }

    pub fn fresh_name(&mut self) -> String {
        let new_name = format!("_{}", ascii_name(self.names_generated));
        self.names_generated += 1;
        new_name
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}
