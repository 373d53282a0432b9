//! Per-turn transcript accumulation

/// Input and output text for the current turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    input: String,
    output: String,
}

impl Transcript {
    /// Append a fragment of the user's speech
    pub fn push_input(&mut self, delta: &str) {
        self.input.push_str(delta);
    }

    /// Append a fragment of the model's speech
    pub fn push_output(&mut self, delta: &str) {
        self.output.push_str(delta);
    }

    /// What the user said this turn
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// What the model said this turn
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Drop both buffers together
    pub fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_and_clears_together() {
        let mut transcript = Transcript::default();
        transcript.push_input("What class ");
        transcript.push_input("covers software?");
        transcript.push_output("Class 9.");

        assert_eq!(transcript.input(), "What class covers software?");
        assert_eq!(transcript.output(), "Class 9.");

        transcript.clear();
        assert!(transcript.is_empty());
    }
}
