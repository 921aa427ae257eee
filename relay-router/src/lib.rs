#![forbid(unsafe_code)]

//! A 1:N multiplexer: one shared framed [`Port`] carries many route-scoped
//! conversations, each identified by a [`RouteId`] that a [`Codec`] tags into
//! (and untags out of) every frame. Grounded in
//! `original_source/core/router.go`'s `SimpleRouter`.

use std::sync::Arc;

use dashmap::DashMap;
use relay_core::error::{Error, Result};
use relay_passes::IoVec;
use relay_stream::Port;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Identifies one multiplexed route on a shared port. Assigned by whichever
/// dispatcher owns a router's id space (the intrinsic client context, for the
/// relayer's UDP use); collisions across independent dispatchers don't
/// matter because each router keeps its own `routes` map.
pub type RouteId = u64;

/// Tags and untags the `RouteId` a frame belongs to. `encode` mutates the
/// buffer in place (prepending or appending identifying framing); `decode`
/// consumes that framing and returns the id, leaving the payload behind.
pub trait Codec: Send + Sync {
    fn encode(&self, id: RouteId, iov: &mut IoVec) -> Result<()>;
    fn decode(&self, iov: &mut IoVec) -> Result<RouteId>;
}

/// A single multiplexed route: the route-scoped port the caller reads/writes
/// through, and a one-shot error notification fired when the route's pump
/// task stops.
pub struct RouteInfo {
    pub port: Arc<dyn Port>,
    err_rx: tokio::sync::Mutex<Option<oneshot::Receiver<Error>>>,
}

impl RouteInfo {
    /// Waits for the route's pump task to terminate and returns the error
    /// that stopped it. Resolves to `None` if called more than once (the
    /// receiver is only good for one observation).
    pub async fn wait_for_error(&self) -> Option<Error> {
        let mut guard = self.err_rx.lock().await;
        guard.take()?.await.ok()
    }
}

/// A 1:N router: `shared` is the "one" side everyone's traffic is
/// multiplexed onto; `routes` maps each `RouteId` to the route-scoped port on
/// the "N" side.
pub struct Router {
    shared: Arc<dyn Port>,
    codec: Arc<dyn Codec>,
    routes: DashMap<RouteId, Arc<RouteInfo>>,
}

impl Router {
    pub fn new(shared: Arc<dyn Port>, codec: Arc<dyn Codec>) -> Arc<Self> {
        Arc::new(Self {
            shared,
            codec,
            routes: DashMap::new(),
        })
    }

    /// Atomically inserts a new route, or returns the existing one if `id`
    /// is already registered. The caller must treat that as "already
    /// exists" and not reuse `id` while the existing route is live.
    pub fn new_route(router: &Arc<Self>, id: RouteId, port: Arc<dyn Port>) -> (Arc<RouteInfo>, Result<()>) {
        let (tx, rx) = oneshot::channel();
        let ri = Arc::new(RouteInfo {
            port,
            err_rx: tokio::sync::Mutex::new(Some(rx)),
        });
        match router.routes.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                let existing = existing.get().clone();
                (existing, Err(Error::protocol(format!("route #{id} already exists"))))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(ri.clone());
                let router = Arc::clone(router);
                let route_port = Arc::clone(&ri.port);
                tokio::spawn(async move {
                    let err = router.pump_route(id, route_port).await;
                    router.routes.remove(&id);
                    let _ = tx.send(err);
                });
                (ri, Ok(()))
            }
        }
    }

    /// One route's pump: read from the route-scoped port, tag it with `id`
    /// via the codec, write it onto the shared port. Runs until either side
    /// errors.
    async fn pump_route(&self, id: RouteId, route_port: Arc<dyn Port>) -> Error {
        loop {
            let mut iov = match route_port.unpack().await {
                Ok(iov) => iov,
                Err(e) => return e,
            };
            if let Err(e) = self.codec.encode(id, &mut iov) {
                return e;
            }
            if let Err(e) = self.shared.pack(iov).await {
                return e;
            }
        }
    }

    /// The dispatcher loop: reads one frame off the shared port, decodes its
    /// `RouteId`, and spawns a task to deliver it to that route's port. Each
    /// delivery gets its own task so one slow/blocked route never stalls the
    /// dispatcher reading the next frame.
    pub async fn run(self: Arc<Self>) {
        loop {
            let mut iov = match self.shared.unpack().await {
                Ok(iov) => iov,
                Err(e) => {
                    debug!(error = %e, "router: shared port closed");
                    return;
                }
            };
            let id = match self.codec.decode(&mut iov) {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "router: dropping frame with undecodable route id");
                    continue;
                }
            };
            let Some(ri) = self.routes.get(&id).map(|r| r.value().clone()) else {
                warn!(route_id = id, "router: no such route, dropping frame");
                continue;
            };
            tokio::spawn(async move {
                let _ = ri.port.pack(iov).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_stream::port::{AsyncDuplex, RawNetPort};
    use std::time::Duration;

    struct TagLastByteCodec;

    impl Codec for TagLastByteCodec {
        fn encode(&self, id: RouteId, iov: &mut IoVec) -> Result<()> {
            let mut buf = iov.consume().to_vec();
            buf.push(id as u8);
            *iov = IoVec::from(buf);
            Ok(())
        }

        fn decode(&self, iov: &mut IoVec) -> Result<RouteId> {
            let tag = iov
                .last_byte()
                .ok_or_else(|| Error::protocol("empty frame, no route tag"))?;
            iov.drop_tail(1)?;
            Ok(tag as RouteId)
        }
    }

    async fn raw_port_pair() -> (Arc<dyn Port>, Arc<dyn Port>) {
        let (a, b) = tokio::io::duplex(8192);
        let (a_r, a_w) = tokio::io::split(Box::new(a) as Box<dyn AsyncDuplex>);
        let (b_r, b_w) = tokio::io::split(Box::new(b) as Box<dyn AsyncDuplex>);
        let pa = RawNetPort::from_halves(a_r, a_w, Duration::from_secs(5));
        let pb = RawNetPort::from_halves(b_r, b_w, Duration::from_secs(5));
        (Arc::new(pa), Arc::new(pb))
    }

    #[tokio::test]
    async fn new_route_rejects_duplicate_ids() {
        let (shared_local, _shared_remote) = raw_port_pair().await;
        let router = Router::new(shared_local, Arc::new(TagLastByteCodec));
        let (route_port, _peer) = raw_port_pair().await;
        let (_ri1, r1) = Router::new_route(&router, 7, route_port.clone());
        assert!(r1.is_ok());
        let (_ri2, r2) = Router::new_route(&router, 7, route_port);
        assert!(r2.is_err());
    }

    #[tokio::test]
    async fn routes_frame_to_registered_route_by_id() {
        let (shared_local, shared_remote) = raw_port_pair().await;
        let (route_local, route_remote) = raw_port_pair().await;

        let router = Router::new(shared_local, Arc::new(TagLastByteCodec));
        let (_ri, res) = Router::new_route(&router, 3, route_local);
        assert!(res.is_ok());
        let dispatcher = tokio::spawn(Router::run(router));

        let mut payload = b"hello-route".to_vec();
        payload.push(3);
        shared_remote.pack(IoVec::from(payload)).await.unwrap();

        let got = route_remote.unpack().await.unwrap();
        assert_eq!(got.concat().as_ref(), b"hello-route");
        dispatcher.abort();
    }
}
