use crate::exchanges::okx::connection::ConnectionClass;
use crate::exchanges::okx::types::Args;

/// Substring identifying order-book depth channels, which are served on the
/// public class only.
pub const DEPTH_CHANNEL_MARKER: &str = "books";

/// One argument record per channel: `channel=<name>` overlaid with `extras`.
///
/// Extras are written after the channel name, so an extra named `channel`
/// wins. With no channel names a single record holding only `extras` is
/// produced.
pub fn build_args<S: AsRef<str>>(channels: &[S], extras: &Args) -> Vec<Args> {
    if channels.is_empty() {
        return vec![extras.clone()];
    }

    channels
        .iter()
        .map(|name| {
            let mut record = Args::new();
            record.insert("channel".to_string(), name.as_ref().to_string());
            record.extend(extras.iter().map(|(k, v)| (k.clone(), v.clone())));
            record
        })
        .collect()
}

/// Class a request is actually sent on; depth channels requested on the
/// private class are moved to the public one.
pub fn route_class(requested: ConnectionClass, args: &[Args]) -> ConnectionClass {
    let depth = args
        .first()
        .and_then(|record| record.get("channel"))
        .is_some_and(|channel| channel.contains(DEPTH_CHANNEL_MARKER));

    if depth && requested.is_private() {
        ConnectionClass::Public
    } else {
        requested
    }
}
