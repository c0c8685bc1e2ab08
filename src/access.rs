use std::collections::HashSet;

/// Static allow-list of chat ids permitted to use the chat flow.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    allowed: HashSet<i64>,
    rejection_message: String,
}

impl AccessGuard {
    pub fn new(allowed: impl IntoIterator<Item = i64>, rejection_message: impl Into<String>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
            rejection_message: rejection_message.into(),
        }
    }

    pub fn is_allowed(&self, chat_id: i64) -> bool {
        self.allowed.contains(&chat_id)
    }

    /// Notice sent to a rejected chat; names the chat id so the requester can
    /// pass it on to the owner.
    pub fn rejection_notice(&self, chat_id: i64) -> String {
        format!("{}\n\n{}", self.rejection_message, chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_ids() {
        let guard = AccessGuard::new([5676905887, 6467542001], "no");
        assert!(guard.is_allowed(5676905887));
        assert!(guard.is_allowed(6467542001));
        assert!(!guard.is_allowed(1));
    }

    #[test]
    fn test_empty_list_rejects_everyone() {
        let guard = AccessGuard::new([], "no");
        assert!(!guard.is_allowed(0));
    }

    #[test]
    fn test_rejection_notice_format() {
        let guard = AccessGuard::new([], "You are not whitelisted.");
        assert_eq!(guard.rejection_notice(-42), "You are not whitelisted.\n\n-42");
    }
}
