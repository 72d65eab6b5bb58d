//! NVMe-oF target registry
//!
//! The Target owns the fabric-target configuration, the registered transport
//! backends, the active listen addresses, and the subsystem collection, and
//! drives connection acceptance through `poll`. It is an explicitly owned
//! handle: create as many independent instances as needed and serialize all
//! access on one control thread.

use crate::trace::{IoTracePoint, TraceEvent, TraceRecorder, OBJECT_NVMF_IO};
use crate::transport::{Transport, TransportId, TransportType};
use std::collections::TryReserveError;
use std::time::Instant;
use thiserror::Error;

/// Maximum number of subsystems a target will hold
pub const MAX_SUBSYSTEMS: usize = 4;

/// Target registry errors
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("allocation failure: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("a {0} transport is already registered")]
    DuplicateTransport(TransportType),

    #[error("listen address destroyed with no registered {0} transport")]
    ConfigurationInconsistency(TransportType),

    #[error("no such listen address: {0}")]
    UnknownListenAddr(TransportId),

    #[error("subsystem limit reached")]
    SubsystemLimit,

    #[error("subsystem already exists: {0}")]
    DuplicateSubsystem(String),

    #[error("no such subsystem: {0}")]
    UnknownSubsystem(String),
}

/// Result type for target operations
pub type TargetResult<T> = Result<T, TargetError>;

/// Target configuration, fixed at creation.
///
/// Values are stored verbatim; the target performs no magnitude validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetOpts {
    pub max_queue_depth: u16,
    pub max_qpairs_per_ctrlr: u16,
    pub in_capsule_data_size: u32,
    pub max_io_size: u32,
}

/// An active listen address: a transport identifier the target has been told
/// to accept connections on. Holds the key only; the owning transport is
/// resolved by registry lookup at use time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddr {
    trid: TransportId,
}

impl ListenAddr {
    pub fn trid(&self) -> &TransportId {
        &self.trid
    }
}

/// A subsystem registered with the target. Command dispatch and namespace
/// membership live outside the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsystem {
    pub id: u32,
    pub nqn: String,
}

/// The NVMe-oF target registry
pub struct Target {
    opts: TargetOpts,
    discovery_genctr: u64,
    discovery_log_page: Option<Vec<u8>>,
    current_subsystem_id: u32,
    subsystems: Vec<Subsystem>,
    listen_addrs: Vec<ListenAddr>,
    transports: Vec<Box<dyn Transport>>,
    recorder: Option<Box<dyn TraceRecorder>>,
    created: Instant,
}

impl Target {
    /// Create a target with the given configuration. Values are trusted
    /// as-is; all collections start empty.
    pub fn new(opts: TargetOpts) -> Self {
        log::trace!("Max Queue Pairs Per Controller: {}", opts.max_qpairs_per_ctrlr);
        log::trace!("Max Queue Depth: {}", opts.max_queue_depth);
        log::trace!("Max In Capsule Data: {} bytes", opts.in_capsule_data_size);
        log::trace!("Max I/O Size: {} bytes", opts.max_io_size);

        Self {
            opts,
            discovery_genctr: 0,
            discovery_log_page: None,
            current_subsystem_id: 0,
            subsystems: Vec::new(),
            listen_addrs: Vec::new(),
            transports: Vec::new(),
            recorder: None,
            created: Instant::now(),
        }
    }

    pub fn opts(&self) -> &TargetOpts {
        &self.opts
    }

    /// Discovery generation counter. Bumped on every topology-affecting
    /// removal; a consumer holding a cached discovery log page compares
    /// counters to detect staleness.
    pub fn discovery_genctr(&self) -> u64 {
        self.discovery_genctr
    }

    /// The cached discovery log page, if a collaborator has populated one.
    /// The registry never generates or invalidates the bytes itself.
    pub fn discovery_log_page(&self) -> Option<&[u8]> {
        self.discovery_log_page.as_deref()
    }

    /// Install a regenerated discovery log page.
    pub fn set_discovery_log_page(&mut self, page: Vec<u8>) {
        self.discovery_log_page = Some(page);
    }

    /// Register a transport backend. At most one instance per transport
    /// type; duplicates are rejected here rather than trusted to lookups.
    pub fn add_transport(&mut self, transport: Box<dyn Transport>) -> TargetResult<()> {
        let trtype = transport.transport_type();
        if self.get_transport(trtype).is_some() {
            return Err(TargetError::DuplicateTransport(trtype));
        }

        self.transports.try_reserve(1)?;
        self.transports.push(transport);
        log::info!("Registered {} transport", trtype);
        Ok(())
    }

    /// Look up the registered transport serving `trtype`. A miss is not an
    /// error. Linear scan; the number of fabric transport types is small.
    pub fn get_transport(&self, trtype: TransportType) -> Option<&dyn Transport> {
        self.transports
            .iter()
            .find(|t| t.transport_type() == trtype)
            .map(|t| t.as_ref())
    }

    /// Mutable lookup, for external paths that drive a backend directly
    /// (start-listen lives outside the registry).
    pub fn get_transport_mut(&mut self, trtype: TransportType) -> Option<&mut dyn Transport> {
        self.transports
            .iter_mut()
            .find(|t| t.transport_type() == trtype)
            .map(|t| &mut **t as &mut dyn Transport)
    }

    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    /// Create a listen address record for `trid`. The identifier is copied
    /// by value; no transport interaction happens here - binding is the
    /// separate start-listen path.
    pub fn listen_addr_create(&mut self, trid: TransportId) -> TargetResult<&ListenAddr> {
        self.listen_addrs.try_reserve(1)?;
        self.listen_addrs.push(ListenAddr { trid });
        Ok(self.listen_addrs.last().unwrap())
    }

    /// Destroy the listen address matching `trid`: stop listening on the
    /// owning transport, unlink the record, and bump the discovery counter.
    ///
    /// If no transport of the address's type is registered the record stays
    /// linked and the counter is untouched; the inconsistency is logged and
    /// returned so callers can decide what to do with it.
    pub fn listen_addr_destroy(&mut self, trid: &TransportId) -> TargetResult<()> {
        let idx = self
            .listen_addrs
            .iter()
            .position(|a| &a.trid == trid)
            .ok_or_else(|| TargetError::UnknownListenAddr(trid.clone()))?;

        let transport = self
            .transports
            .iter_mut()
            .find(|t| t.transport_type() == trid.trtype);

        let Some(transport) = transport else {
            log::error!("Attempted to destroy listener {} without a valid transport", trid);
            return Err(TargetError::ConfigurationInconsistency(trid.trtype));
        };

        if let Err(e) = transport.stop_listen(trid) {
            log::warn!("Error stopping listener {}: {}", trid, e);
        }
        self.listen_addrs.remove(idx);
        self.discovery_genctr += 1;
        log::info!("Destroyed listener {}", trid);
        Ok(())
    }

    pub fn listen_addrs(&self) -> &[ListenAddr] {
        &self.listen_addrs
    }

    /// Add a subsystem by NQN, returning its assigned id.
    pub fn add_subsystem(&mut self, nqn: &str) -> TargetResult<u32> {
        if self.subsystems.len() >= MAX_SUBSYSTEMS {
            return Err(TargetError::SubsystemLimit);
        }
        if self.subsystems.iter().any(|s| s.nqn == nqn) {
            return Err(TargetError::DuplicateSubsystem(nqn.to_string()));
        }

        self.subsystems.try_reserve(1)?;
        let id = self.current_subsystem_id;
        self.current_subsystem_id += 1;
        self.subsystems.push(Subsystem {
            id,
            nqn: nqn.to_string(),
        });
        log::info!("Added subsystem {}: {}", id, nqn);
        Ok(id)
    }

    /// Remove a subsystem by NQN.
    pub fn remove_subsystem(&mut self, nqn: &str) -> TargetResult<Subsystem> {
        let idx = self
            .subsystems
            .iter()
            .position(|s| s.nqn == nqn)
            .ok_or_else(|| TargetError::UnknownSubsystem(nqn.to_string()))?;
        let subsystem = self.subsystems.remove(idx);
        log::info!("Removed subsystem {}: {}", subsystem.id, subsystem.nqn);
        Ok(subsystem)
    }

    pub fn subsystems(&self) -> &[Subsystem] {
        &self.subsystems
    }

    /// One acceptance pass: service every registered transport's accept
    /// operation once. Outcomes are not aggregated; each backend handles
    /// its own errors. Returns immediately when no transports are
    /// registered. The exclusive borrow rules out mutation of the registry
    /// during the pass.
    pub fn poll(&mut self) {
        for transport in &mut self.transports {
            transport.accept();
        }
    }

    /// Tear the target down. Listen addresses are drained first (each
    /// removal bumps the discovery counter, then runs the stop-listen
    /// path), transports after, since address teardown needs transport
    /// lookup to succeed. Failures inside individual steps are logged and
    /// never abort the remaining teardown. Leaves every collection empty.
    /// Not re-entrant.
    pub fn fini(&mut self) {
        let addrs = std::mem::take(&mut self.listen_addrs);
        for addr in addrs {
            self.discovery_genctr += 1;

            match self
                .transports
                .iter_mut()
                .find(|t| t.transport_type() == addr.trid.trtype)
            {
                Some(transport) => {
                    if let Err(e) = transport.stop_listen(&addr.trid) {
                        log::warn!("Error stopping listener {}: {}", addr.trid, e);
                    }
                }
                None => {
                    log::error!(
                        "Attempted to destroy listener {} without a valid transport",
                        addr.trid
                    );
                }
            }
        }

        let mut transports = std::mem::take(&mut self.transports);
        for transport in &mut transports {
            transport.destroy();
        }

        self.subsystems.clear();
        log::info!("Target finalized");
    }

    /// Install the trace recorder and register the NVMf I/O event catalog
    /// with it.
    pub fn set_trace_recorder(&mut self, mut recorder: Box<dyn TraceRecorder>) {
        recorder.register(OBJECT_NVMF_IO, &IoTracePoint::ALL);
        self.recorder = Some(recorder);
    }

    /// Emit a trace point for an I/O object. No-op without a recorder.
    pub fn trace(&mut self, point: IoTracePoint, object_id: u64) {
        if let Some(recorder) = self.recorder.as_mut() {
            let event = TraceEvent {
                category: OBJECT_NVMF_IO,
                point,
                object_id,
                phase: point.phase(),
                timestamp_us: self.created.elapsed().as_micros() as u64,
            };
            recorder.record(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{AddressFamily, TransportError, TransportResult};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Calls {
        stopped: Vec<TransportId>,
        accepts: usize,
        destroys: usize,
    }

    struct MockTransport {
        trtype: TransportType,
        calls: Rc<RefCell<Calls>>,
        fail_stop: bool,
    }

    impl MockTransport {
        fn new(trtype: TransportType) -> (Box<Self>, Rc<RefCell<Calls>>) {
            let calls = Rc::new(RefCell::new(Calls::default()));
            let t = Box::new(Self {
                trtype,
                calls: Rc::clone(&calls),
                fail_stop: false,
            });
            (t, calls)
        }
    }

    impl Transport for MockTransport {
        fn transport_type(&self) -> TransportType {
            self.trtype
        }

        fn start_listen(&mut self, _trid: &TransportId) -> TransportResult<()> {
            Ok(())
        }

        fn stop_listen(&mut self, trid: &TransportId) -> TransportResult<()> {
            self.calls.borrow_mut().stopped.push(trid.clone());
            if self.fail_stop {
                Err(TransportError::NotListening(trid.to_string()))
            } else {
                Ok(())
            }
        }

        fn accept(&mut self) {
            self.calls.borrow_mut().accepts += 1;
        }

        fn destroy(&mut self) {
            self.calls.borrow_mut().destroys += 1;
        }
    }

    fn opts() -> TargetOpts {
        TargetOpts {
            max_queue_depth: 128,
            max_qpairs_per_ctrlr: 64,
            in_capsule_data_size: 4096,
            max_io_size: 131072,
        }
    }

    fn tcp_trid(port: &str) -> TransportId {
        TransportId::new(TransportType::Tcp, AddressFamily::Ipv4, "127.0.0.1", port)
    }

    #[test]
    fn test_new_reads_back_config() {
        let tgt = Target::new(opts());
        assert_eq!(tgt.opts().max_queue_depth, 128);
        assert_eq!(tgt.opts().max_qpairs_per_ctrlr, 64);
        assert_eq!(tgt.opts().in_capsule_data_size, 4096);
        assert_eq!(tgt.opts().max_io_size, 131072);
        assert_eq!(tgt.discovery_genctr(), 0);
        assert!(tgt.discovery_log_page().is_none());
        assert!(tgt.subsystems().is_empty());
        assert!(tgt.listen_addrs().is_empty());
        assert_eq!(tgt.transport_count(), 0);
    }

    #[test]
    fn test_get_transport_empty_registry() {
        let tgt = Target::new(opts());
        for trtype in [TransportType::Rdma, TransportType::Fc, TransportType::Tcp] {
            assert!(tgt.get_transport(trtype).is_none());
        }
    }

    #[test]
    fn test_get_transport_finds_by_type() {
        let mut tgt = Target::new(opts());
        let (tcp, _) = MockTransport::new(TransportType::Tcp);
        let (rdma, _) = MockTransport::new(TransportType::Rdma);
        tgt.add_transport(tcp).unwrap();
        tgt.add_transport(rdma).unwrap();

        let found = tgt.get_transport(TransportType::Rdma).unwrap();
        assert_eq!(found.transport_type(), TransportType::Rdma);
        assert!(tgt.get_transport(TransportType::Fc).is_none());
    }

    #[test]
    fn test_duplicate_transport_rejected() {
        let mut tgt = Target::new(opts());
        let (a, _) = MockTransport::new(TransportType::Tcp);
        let (b, _) = MockTransport::new(TransportType::Tcp);
        tgt.add_transport(a).unwrap();
        let err = tgt.add_transport(b).unwrap_err();
        assert!(matches!(err, TargetError::DuplicateTransport(TransportType::Tcp)));
        assert_eq!(tgt.transport_count(), 1);
    }

    #[test]
    fn test_listen_addr_create_copies_trid() {
        let mut tgt = Target::new(opts());
        let trid = tcp_trid("4420");
        let addr = tgt.listen_addr_create(trid.clone()).unwrap();
        assert_eq!(addr.trid(), &trid);

        let other = tcp_trid("4421");
        tgt.listen_addr_create(other.clone()).unwrap();
        assert_eq!(tgt.listen_addrs().len(), 2);
        assert!(tgt.listen_addrs().iter().any(|a| a.trid() == &trid));
        assert!(tgt.listen_addrs().iter().any(|a| a.trid() == &other));
    }

    #[test]
    fn test_destroy_with_transport_stops_listen_and_bumps_genctr() {
        let mut tgt = Target::new(opts());
        let (tcp, calls) = MockTransport::new(TransportType::Tcp);
        tgt.add_transport(tcp).unwrap();

        let trid = tcp_trid("4420");
        tgt.listen_addr_create(trid.clone()).unwrap();
        let before = tgt.discovery_genctr();

        tgt.listen_addr_destroy(&trid).unwrap();

        assert_eq!(calls.borrow().stopped, vec![trid.clone()]);
        assert!(tgt.listen_addrs().is_empty());
        assert_eq!(tgt.discovery_genctr(), before + 1);
    }

    #[test]
    fn test_destroy_without_transport_leaves_addr_linked() {
        let mut tgt = Target::new(opts());
        let trid = tcp_trid("4420");
        tgt.listen_addr_create(trid.clone()).unwrap();
        let before = tgt.discovery_genctr();

        let err = tgt.listen_addr_destroy(&trid).unwrap_err();
        assert!(matches!(
            err,
            TargetError::ConfigurationInconsistency(TransportType::Tcp)
        ));
        assert_eq!(tgt.discovery_genctr(), before);
        assert_eq!(tgt.listen_addrs().len(), 1);
        assert_eq!(tgt.listen_addrs()[0].trid(), &trid);
    }

    #[test]
    fn test_destroy_unknown_addr() {
        let mut tgt = Target::new(opts());
        let (tcp, _) = MockTransport::new(TransportType::Tcp);
        tgt.add_transport(tcp).unwrap();

        let err = tgt.listen_addr_destroy(&tcp_trid("4420")).unwrap_err();
        assert!(matches!(err, TargetError::UnknownListenAddr(_)));
        assert_eq!(tgt.discovery_genctr(), 0);
    }

    #[test]
    fn test_destroy_failed_stop_listen_still_unlinks() {
        let mut tgt = Target::new(opts());
        let calls = Rc::new(RefCell::new(Calls::default()));
        tgt.add_transport(Box::new(MockTransport {
            trtype: TransportType::Tcp,
            calls: Rc::clone(&calls),
            fail_stop: true,
        }))
        .unwrap();

        let trid = tcp_trid("4420");
        tgt.listen_addr_create(trid.clone()).unwrap();
        tgt.listen_addr_destroy(&trid).unwrap();

        assert!(tgt.listen_addrs().is_empty());
        assert_eq!(tgt.discovery_genctr(), 1);
    }

    #[test]
    fn test_fini_drains_addrs_then_transports() {
        let mut tgt = Target::new(opts());
        let (tcp, tcp_calls) = MockTransport::new(TransportType::Tcp);
        let (rdma, rdma_calls) = MockTransport::new(TransportType::Rdma);
        tgt.add_transport(tcp).unwrap();
        tgt.add_transport(rdma).unwrap();

        tgt.listen_addr_create(tcp_trid("4420")).unwrap();
        tgt.listen_addr_create(tcp_trid("4421")).unwrap();
        tgt.listen_addr_create(TransportId::new(
            TransportType::Rdma,
            AddressFamily::Ipv4,
            "10.0.0.1",
            "4420",
        ))
        .unwrap();
        tgt.add_subsystem("nqn.2016-06.io.spdk:cnode1").unwrap();
        let before = tgt.discovery_genctr();

        tgt.fini();

        assert!(tgt.listen_addrs().is_empty());
        assert_eq!(tgt.transport_count(), 0);
        assert!(tgt.subsystems().is_empty());
        assert!(tgt.discovery_genctr() >= before + 3);
        assert_eq!(tcp_calls.borrow().destroys, 1);
        assert_eq!(rdma_calls.borrow().destroys, 1);
        assert_eq!(tcp_calls.borrow().stopped.len(), 2);
        assert_eq!(rdma_calls.borrow().stopped.len(), 1);
    }

    #[test]
    fn test_fini_with_orphaned_addr_still_empties() {
        let mut tgt = Target::new(opts());
        // Address whose transport was never registered
        tgt.listen_addr_create(tcp_trid("4420")).unwrap();

        tgt.fini();

        assert!(tgt.listen_addrs().is_empty());
        assert_eq!(tgt.discovery_genctr(), 1);
    }

    #[test]
    fn test_poll_empty_registry_is_noop() {
        let mut tgt = Target::new(opts());
        tgt.poll();
        assert_eq!(tgt.transport_count(), 0);
    }

    #[test]
    fn test_poll_accepts_every_transport_once() {
        let mut tgt = Target::new(opts());
        let (tcp, tcp_calls) = MockTransport::new(TransportType::Tcp);
        let (rdma, rdma_calls) = MockTransport::new(TransportType::Rdma);
        tgt.add_transport(tcp).unwrap();
        tgt.add_transport(rdma).unwrap();

        tgt.poll();
        tgt.poll();

        assert_eq!(tcp_calls.borrow().accepts, 2);
        assert_eq!(rdma_calls.borrow().accepts, 2);
    }

    #[test]
    fn test_subsystem_limit_and_ids() {
        let mut tgt = Target::new(opts());
        for i in 0..MAX_SUBSYSTEMS {
            let id = tgt.add_subsystem(&format!("nqn.2016-06.io.spdk:cnode{}", i)).unwrap();
            assert_eq!(id as usize, i);
        }
        let err = tgt.add_subsystem("nqn.2016-06.io.spdk:overflow").unwrap_err();
        assert!(matches!(err, TargetError::SubsystemLimit));

        // Ids keep advancing after a removal; they are never reused
        tgt.remove_subsystem("nqn.2016-06.io.spdk:cnode0").unwrap();
        let id = tgt.add_subsystem("nqn.2016-06.io.spdk:cnode9").unwrap();
        assert_eq!(id as usize, MAX_SUBSYSTEMS);
    }

    #[test]
    fn test_duplicate_subsystem_rejected() {
        let mut tgt = Target::new(opts());
        tgt.add_subsystem("nqn.2016-06.io.spdk:cnode1").unwrap();
        let err = tgt.add_subsystem("nqn.2016-06.io.spdk:cnode1").unwrap_err();
        assert!(matches!(err, TargetError::DuplicateSubsystem(_)));
    }

    #[test]
    fn test_discovery_log_page_is_caller_owned() {
        let mut tgt = Target::new(opts());
        tgt.set_discovery_log_page(vec![0u8; 512]);
        assert_eq!(tgt.discovery_log_page().unwrap().len(), 512);
        // Installing a page does not touch the generation counter
        assert_eq!(tgt.discovery_genctr(), 0);
    }

    #[test]
    fn test_trace_recorder_registration_and_events() {
        use crate::trace::{TraceEvent, TracePhase};

        #[derive(Default)]
        struct Capture {
            registered: Vec<(&'static str, usize)>,
            events: Vec<(IoTracePoint, u64, TracePhase)>,
        }

        struct CaptureRecorder(Rc<RefCell<Capture>>);

        impl TraceRecorder for CaptureRecorder {
            fn register(&mut self, category: &'static str, points: &[IoTracePoint]) {
                self.0.borrow_mut().registered.push((category, points.len()));
            }

            fn record(&mut self, event: &TraceEvent) {
                self.0
                    .borrow_mut()
                    .events
                    .push((event.point, event.object_id, event.phase));
            }
        }

        let capture = Rc::new(RefCell::new(Capture::default()));
        let mut tgt = Target::new(opts());
        tgt.set_trace_recorder(Box::new(CaptureRecorder(Rc::clone(&capture))));

        tgt.trace(IoTracePoint::IoStart, 0x1234);
        tgt.trace(IoTracePoint::IoCompletionDone, 0x1234);

        let capture = capture.borrow();
        assert_eq!(capture.registered, vec![(OBJECT_NVMF_IO, 9)]);
        assert_eq!(capture.events.len(), 2);
        assert_eq!(capture.events[0].0, IoTracePoint::IoStart);
        assert_eq!(capture.events[0].1, 0x1234);
        assert_eq!(capture.events[0].2, TracePhase::Begin);
        assert_eq!(capture.events[1].2, TracePhase::End);
    }
}
