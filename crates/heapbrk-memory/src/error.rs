#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("maximum of {maximum} pages is below the initial {initial} pages")]
    MaximumBelowInitial { initial: usize, maximum: usize },

    #[error("maximum of {0} pages does not fit in the address space")]
    MaximumTooLarge(usize),

    #[error("invalid growth step: {0}%")]
    InvalidGrowthStep(usize),
}
