//! Runtime adapters for the dashboard

mod demo;

#[cfg(feature = "docker")]
mod docker;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};

use dockview_core::adapter::{AdapterError, LogByteStream};

pub use demo::DemoAdapter;

#[cfg(feature = "docker")]
pub use docker::DockerAdapter;

/// Prefix every line of `inner` with `[name] `. Only complete lines are
/// passed on, so a partial line never gets split around another member's
/// output once streams are merged. An unterminated tail is flushed as its
/// own line when `inner` ends.
pub fn prefixed(name: &str, inner: LogByteStream) -> LogByteStream {
    let prefix = format!("[{name}] ").into_bytes();
    stream::unfold(Some((inner, Vec::new(), prefix)), |state| async move {
        let (mut inner, mut partial, prefix) = state?;
        loop {
            match inner.next().await {
                Some(Ok(chunk)) => {
                    partial.extend_from_slice(&chunk);
                    let Some(end) = partial.iter().rposition(|b| *b == b'\n') else {
                        continue;
                    };
                    let rest = partial.split_off(end + 1);
                    let out = tag_lines(&prefix, &partial);
                    return Some((Ok(out), Some((inner, rest, prefix))));
                }
                Some(Err(err)) => return Some((Err(err), Some((inner, partial, prefix)))),
                None => {
                    if partial.is_empty() {
                        return None;
                    }
                    partial.push(b'\n');
                    return Some((Ok(tag_lines(&prefix, &partial)), None));
                }
            }
        }
    })
    .boxed()
}

fn tag_lines(prefix: &[u8], lines: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(lines.len() + prefix.len());
    for line in lines.split_inclusive(|b| *b == b'\n') {
        out.extend_from_slice(prefix);
        out.extend_from_slice(line);
    }
    out
}

/// Merge member streams of a stack or service into one, each line tagged
/// with the container it came from.
pub fn merged(members: Vec<(String, LogByteStream)>) -> LogByteStream {
    let streams: Vec<BoxStream<'static, Result<Vec<u8>, AdapterError>>> = members
        .into_iter()
        .map(|(name, s)| prefixed(&name, s))
        .collect();
    stream::select_all(streams).boxed()
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.0}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}
