use quiz_core::time::format_countdown;

/// Aggregated view of attempt progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    /// 1-based position of the current question.
    pub position: usize,
    pub total: usize,
    pub answered: usize,
    pub locked: usize,
    pub remaining_secs: u32,
    pub is_time_running_out: bool,
    pub is_last_question: bool,
    pub can_go_previous: bool,
    pub can_go_next: bool,
    pub is_complete: bool,
}

impl SessionProgress {
    /// Remaining time as `M:SS`.
    #[must_use]
    pub fn countdown(&self) -> String {
        format_countdown(self.remaining_secs)
    }
}
