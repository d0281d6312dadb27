/// Requests plugins and the console can send to the running bot.
/// They are handled between events by the bot service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// Re-run the plugin loader and swap in the new registry
    Reload,
    Join(String),
    Part(String),
}
