//! HTTP client for a running server.
//!
//! Request/response calls are blocking (ureq). The event stream is read
//! asynchronously with reqwest and decoded by `eventsource-stream`.

use std::fmt::Display;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use url::Url;

use grimoire_core::{PlotPath, Tree};
use grimoire_server::protocol::{
    ChangeBody, DeleteResponse, ErrorBody, PrefixQuery, PushRequest, PushResponse, SnapshotBody,
};
use grimoire_server::SECRET_HEADER;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Client {
    agent: ureq::Agent,
    base: Url,
}

impl Client {
    pub fn new(server: &str) -> Result<Self> {
        let base = Url::parse(server).with_context(|| format!("invalid server URL {server:?}"))?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .build();
        Ok(Self { agent, base })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("server URL {} cannot have a path", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn push(&self, secret: &str, request: &PushRequest) -> Result<PushResponse> {
        let url = self.url(&["add_plot"])?;
        let response = self
            .agent
            .post(url.as_str())
            .set(SECRET_HEADER, secret)
            .send_json(request)
            .map_err(describe)?;
        response.into_json().context("malformed push response")
    }

    /// `segments` is the route under the server root, e.g.
    /// `["grimoire", "exp1", "chapter", "metrics"]`.
    pub fn delete(&self, secret: &str, segments: &[&str]) -> Result<DeleteResponse> {
        let url = self.url(segments)?;
        let response = self
            .agent
            .delete(url.as_str())
            .set(SECRET_HEADER, secret)
            .call()
            .map_err(describe)?;
        response.into_json().context("malformed delete response")
    }

    pub fn tree(&self) -> Result<Tree> {
        let url = self.url(&["api", "tree"])?;
        let response = self.agent.get(url.as_str()).call().map_err(describe)?;
        response.into_json().context("malformed tree response")
    }

    pub fn snapshot(&self, path: &PlotPath) -> Result<SnapshotBody> {
        let url = self.url(&[
            "api",
            "plot",
            &path.grimoire.0,
            &path.chapter.0,
            &path.plot.0,
        ])?;
        let response = self.agent.get(url.as_str()).call().map_err(describe)?;
        response.into_json().context("malformed snapshot response")
    }

    /// Open the event stream and hand each event to `on_event` until the
    /// server closes it.
    pub fn follow(&self, prefix: &PrefixQuery, mut on_event: impl FnMut(SseEvent)) -> Result<()> {
        let mut url = self.url(&["api", "events"])?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in [
                ("grimoire", &prefix.grimoire),
                ("chapter", &prefix.chapter),
                ("plot", &prefix.plot),
            ] {
                if let Some(value) = value {
                    query.append_pair(key, value);
                }
            }
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start the event stream runtime")?;
        runtime.block_on(async {
            let client = reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .context("failed to build the event stream client")?;
            let response = client
                .get(url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .send()
                .await
                .map_err(|e| anyhow!("could not reach server: {e}"))?;
            let status = response.status().as_u16();
            if !response.status().is_success() {
                return Err(match response.json::<ErrorBody>().await {
                    Ok(body) => {
                        anyhow!("server answered {status} ({}): {}", body.error, body.message)
                    }
                    Err(_) => anyhow!("server answered {status}"),
                });
            }
            read_events(response.bytes_stream(), &mut on_event).await
        })
    }
}

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Change(ChangeBody),
    Resync,
}

async fn read_events<S, B, E>(stream: S, on_event: &mut impl FnMut(SseEvent)) -> Result<()>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut events = Box::pin(stream.eventsource());
    while let Some(event) = events.next().await {
        let event = event.map_err(|e| anyhow!("event stream interrupted: {e}"))?;
        match event.event.as_str() {
            "change" => {
                let change: ChangeBody =
                    serde_json::from_str(&event.data).context("malformed change event")?;
                on_event(SseEvent::Change(change));
            }
            "resync" => on_event(SseEvent::Resync),
            _ => {}
        }
    }
    Ok(())
}

fn describe(err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => match response.into_json::<ErrorBody>() {
            Ok(body) => anyhow!("server answered {code} ({}): {}", body.error, body.message),
            Err(_) => anyhow!("server answered {code}"),
        },
        ureq::Error::Transport(transport) => anyhow!("could not reach server: {transport}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    fn chunks(
        parts: &'static [&'static str],
    ) -> impl Stream<Item = Result<&'static [u8], Infallible>> {
        futures::stream::iter(parts.iter().copied().map(|part| Ok(part.as_bytes())))
    }

    #[tokio::test]
    async fn event_stream_is_split_into_events() {
        // Chunk boundaries fall mid-field, as they do on a real socket.
        let stream = chunks(&[
            "event: chan",
            "ge\r\ndata:{\"grimoire\":\"exp1\",\"chapter\":\"m\",",
            "\"plot\":\"loss\",\"version\":2}\r\n\r\n",
            ": ping\n\n",
            "event: unknown\ndata: 1\n\n",
            "event: resync\ndata: {}\n\n",
        ]);
        let mut seen = Vec::new();
        read_events(stream, &mut |event| seen.push(event)).await.unwrap();
        assert_eq!(
            seen,
            vec![
                SseEvent::Change(ChangeBody {
                    grimoire: "exp1".into(),
                    chapter: "m".into(),
                    plot: "loss".into(),
                    version: 2,
                }),
                SseEvent::Resync,
            ]
        );
    }

    #[tokio::test]
    async fn malformed_change_payload_is_an_error() {
        let stream = chunks(&["event: change\ndata: not json\n\n"]);
        let err = read_events(stream, &mut |_| {}).await.unwrap_err();
        assert!(err.to_string().contains("malformed change event"), "got: {err}");
    }

    #[test]
    fn path_segments_are_encoded() {
        let client = Client::new("http://localhost:8080/").unwrap();
        let url = client.url(&["api", "plot", "my exp", "a?b", "c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/plot/my%20exp/a%3Fb/c");
    }
}
