//! Extraction context for one walk pass.
//!
//! Carries the loop-variable combination bound for the current pass over a
//! tree source. Variable elements read their value from here instead of
//! holding state of their own, so each pass gets a fresh context.

/// Values extracted from one matched loop node, one per variable path
pub type Tuple = Vec<String>;

/// One entry of the Cartesian product: a tuple per loop definition
pub type Combination = Vec<Tuple>;

/// Context shared by every record of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionContext {
    combination: Option<Combination>,

    /// Zero-based index of the pass within the mapping run
    pass: usize,
}

impl ExtractionContext {
    /// Context for a pass without loop variables
    pub fn empty() -> Self {
        Self::default()
    }

    /// Context with a combination bound
    ///
    /// # Example
    /// ```
    /// use dynaload::loader::ExtractionContext;
    ///
    /// let ctx = ExtractionContext::with_combination(
    ///     vec![vec!["2019".to_string()], vec!["north".to_string(), "7".to_string()]],
    ///     0,
    /// );
    /// assert_eq!(ctx.variable(1, 1), Some("7"));
    /// assert_eq!(ctx.variable(2, 0), None);
    /// ```
    pub fn with_combination(combination: Combination, pass: usize) -> Self {
        Self {
            combination: Some(combination),
            pass,
        }
    }

    pub fn combination(&self) -> Option<&Combination> {
        self.combination.as_ref()
    }

    /// `combination[loop_index][variable_index]`, if bound
    pub fn variable(&self, loop_index: usize, variable_index: usize) -> Option<&str> {
        self.combination
            .as_ref()?
            .get(loop_index)?
            .get(variable_index)
            .map(String::as_str)
    }

    pub fn pass(&self) -> usize {
        self.pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_has_no_variables() {
        let ctx = ExtractionContext::empty();
        assert!(ctx.combination().is_none());
        assert_eq!(ctx.variable(0, 0), None);
    }

    #[test]
    fn test_each_pass_sees_only_its_combination() {
        let first = ExtractionContext::with_combination(vec![vec!["a".to_string()]], 0);
        let second = ExtractionContext::with_combination(vec![vec!["b".to_string()]], 1);

        assert_eq!(first.variable(0, 0), Some("a"));
        assert_eq!(second.variable(0, 0), Some("b"));
        assert_eq!(second.pass(), 1);
        assert_eq!(second.variable(0, 1), None);
    }
}
