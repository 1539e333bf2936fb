/// User-visible toast boundary for REST-level failures
pub trait UserNotifier: Send + Sync {
    fn error(&self, message: &str);

    fn info(&self, message: &str);
}
