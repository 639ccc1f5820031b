/// Where user-facing messages from the resolvers end up.
pub(crate) trait Notifier {
    /// Something failed and the user has to act on it.
    fn show_error(&self, message: &str);
    fn show_info(&self, message: &str);
    /// Transient status while a long resolution is running.
    fn show_progress(&self, message: &str);
}

pub(crate) struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn show_error(&self, message: &str) {
        eprintln!("\nerror: {message}");
    }

    fn show_info(&self, message: &str) {
        println!("\n{message}");
    }

    fn show_progress(&self, message: &str) {
        eprintln!("{message}");
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notice {
    Error(String),
    Info(String),
    Progress(String),
}

#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    notices: std::cell::RefCell<Vec<Notice>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub(crate) fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|notice| match notice {
                Notice::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn infos(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|notice| match notice {
                Notice::Info(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn show_error(&self, message: &str) {
        self.notices
            .borrow_mut()
            .push(Notice::Error(message.to_string()));
    }

    fn show_info(&self, message: &str) {
        self.notices
            .borrow_mut()
            .push(Notice::Info(message.to_string()));
    }

    fn show_progress(&self, message: &str) {
        self.notices
            .borrow_mut()
            .push(Notice::Progress(message.to_string()));
    }
}
