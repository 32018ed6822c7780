//! End-to-end tests of update processing.

use std::{
    str::FromStr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU8, Ordering},
    },
};

use async_trait::async_trait;
use domain::base::{
    Rtype, Serial, Ttl,
    iana::{Class, Rcode},
};
use tokio::sync::{mpsc, oneshot};

use crate::center::{self, Center};
use crate::cfg::{Config, ZoneConfig};
use crate::events::{ZoneEvent, ZoneEvents};
use crate::signer::{SignError, SignScope, Signed, ZoneSigner};
use crate::update::forward::{ForwardError, Forwarder};
use crate::update::pipeline::PipelineContext;
use crate::update::{
    Transport, Tsig, UpdateMessage, UpdateRecord, UpdateRequest, UpdateResponse,
};
use crate::zonedata::{
    Changeset, IterMode, Journal, JournalError, MemoryJournal, Rdata, Rrset, StoredName,
    ZoneContents, names_eq,
};

//----------- Helpers ----------------------------------------------------------

/// Parse a domain name.
pub fn name(s: &str) -> StoredName {
    StoredName::from_str(s).unwrap()
}

/// TXT record data with a single character string.
pub fn txt(s: &str) -> Rdata {
    let mut bytes = vec![s.len() as u8];
    bytes.extend_from_slice(s.as_bytes());
    Rdata::from(bytes)
}

/// Record data holding a single domain name (NS, CNAME).
pub fn ns(target: &str) -> Rdata {
    Rdata::from(name(target).as_slice().to_vec())
}

/// SOA record data for the test zone.
pub fn soa_rdata(serial: u32) -> Rdata {
    Rdata::soa(
        &name("ns.example."),
        &name("hostmaster.example."),
        Serial(serial),
        [3600, 900, 604800, 300],
    )
}

/// The test zone, `example.`.
pub fn contents(serial: u32) -> ZoneContents {
    let mut contents = ZoneContents::new(name("example."), Class::IN);
    let rrsets = [
        ("example.", Rtype::SOA, soa_rdata(serial)),
        ("example.", Rtype::NS, ns("ns.example.")),
        ("ns.example.", Rtype::A, Rdata::from(vec![192, 0, 2, 1])),
        ("www.example.", Rtype::TXT, txt("www")),
    ];
    for (owner, rtype, rdata) in rrsets {
        let rrset = Rrset::with_rdata(name(owner), rtype, Class::IN, Ttl::from_secs(3600), [rdata]);
        contents.insert(rrset).unwrap();
    }
    contents
}

/// A record in a prerequisite or update section.
pub fn update_record(owner: &str, class: Class, rtype: Rtype, ttl: u32, rdata: Rdata) -> UpdateRecord {
    UpdateRecord {
        owner: name(owner),
        class,
        rtype,
        ttl: Ttl::from_secs(ttl),
        rdata,
    }
}

/// An update record adding a record.
pub fn add(owner: &str, rtype: Rtype, rdata: Rdata) -> UpdateRecord {
    update_record(owner, Class::IN, rtype, 3600, rdata)
}

/// A prerequisite record.
pub fn prereq(owner: &str, class: Class, rtype: Rtype, rdata: Rdata) -> UpdateRecord {
    update_record(owner, class, rtype, 0, rdata)
}

/// An update message for `example.`.
fn message(id: u16, prerequisites: Vec<UpdateRecord>, updates: Vec<UpdateRecord>) -> UpdateMessage {
    UpdateMessage {
        id,
        zone: name("example."),
        zone_class: Class::IN,
        zone_rtype: Rtype::SOA,
        prerequisites,
        updates,
        tsig: None,
    }
}

/// Submit a request over UDP.
fn submit(center: &Arc<Center>, message: UpdateMessage) -> oneshot::Receiver<UpdateResponse> {
    submit_over(center, message, Transport::Datagram)
}

/// Submit a request.
fn submit_over(
    center: &Arc<Center>,
    message: UpdateMessage,
    transport: Transport,
) -> oneshot::Receiver<UpdateResponse> {
    let client = "192.0.2.53:40000".parse().unwrap();
    let (request, rx) = UpdateRequest::new(message, transport, client);
    center::enqueue(center, request);
    rx
}

/// The response code for a submitted request.
async fn rcode(rx: oneshot::Receiver<UpdateResponse>) -> Rcode {
    rx.await.unwrap().rcode
}

/// Build a center without zones.
fn center(
    journal: Arc<dyn Journal>,
    signer: Option<Arc<dyn ZoneSigner>>,
    forwarder: Option<Arc<dyn Forwarder>>,
) -> (Arc<Center>, mpsc::UnboundedReceiver<ZoneEvent>) {
    let config = Config::default();
    let (events, rx) = ZoneEvents::new();
    let context = PipelineContext {
        journal,
        signer,
        events,
        reclaim_interval: config.updates.reclaim_interval,
    };
    (Arc::new(Center::new(config, context, forwarder)), rx)
}

/// Build a center serving the test zone.
fn primary(
    journal: Arc<dyn Journal>,
) -> (Arc<Center>, mpsc::UnboundedReceiver<ZoneEvent>) {
    let (center, rx) = center(journal, None, None);
    center
        .add_zone(ZoneConfig::new(name("example.")), Some(contents(1)))
        .unwrap();
    (center, rx)
}

/// The published contents of the test zone.
fn published(center: &Center) -> Arc<ZoneContents> {
    center
        .zone(&name("example."))
        .unwrap()
        .contents
        .load()
        .unwrap()
}

//----------- FailingJournal ---------------------------------------------------

/// A journal whose storage is broken.
pub struct FailingJournal;

impl Journal for FailingJournal {
    fn append(&self, _: &StoredName, _: &Changeset) -> Result<(), JournalError> {
        Err(JournalError::Io("disk full".into()))
    }

    fn read_since(&self, _: &StoredName, _: Serial) -> Result<Vec<Changeset>, JournalError> {
        Err(JournalError::Io("disk full".into()))
    }
}

//----------- MockSigner -------------------------------------------------------

/// A signer producing fake signatures.
///
/// Every owner name gets one RRSIG RRset, with one record per covered type.
/// The record data is the covered type followed by a generation number, which
/// increases with every signing run.
#[derive(Default)]
struct MockSigner {
    /// The generation of the last run.
    generation: AtomicU8,

    /// Whether each run was a full one.
    runs: Mutex<Vec<bool>>,
}

impl MockSigner {
    fn starting_at(generation: u8) -> Self {
        Self {
            generation: AtomicU8::new(generation),
            runs: Mutex::default(),
        }
    }

    fn runs(&self) -> Vec<bool> {
        self.runs.lock().unwrap().clone()
    }
}

impl ZoneSigner for MockSigner {
    fn sign(&self, contents: &ZoneContents, scope: SignScope<'_>) -> Result<Signed, SignError> {
        self.runs.lock().unwrap().push(scope.is_full());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let owners: Vec<StoredName> = match scope {
            SignScope::Full => contents.nodes().map(|n| n.owner().clone()).collect(),
            SignScope::Incremental(changeset) => {
                let mut owners: Vec<StoredName> = Vec::new();
                for rrset in changeset.iter(IterMode::All) {
                    if !owners.iter().any(|o| names_eq(o, rrset.owner())) {
                        owners.push(rrset.owner().clone());
                    }
                }
                owners
            }
        };

        let mut changeset = Changeset::new(contents.apex().clone());
        let fail = |err| SignError(format!("{err}"));
        for owner in owners {
            if let Some(old) = contents.rrset(&owner, Rtype::RRSIG) {
                changeset.remove(old.clone()).map_err(fail)?;
            }
            let signatures: Vec<Rdata> = contents
                .node(&owner)
                .into_iter()
                .flat_map(|node| node.rrsets())
                .filter(|rrset| rrset.rtype() != Rtype::RRSIG)
                .map(|rrset| {
                    let [hi, lo] = rrset.rtype().to_int().to_be_bytes();
                    Rdata::from(vec![hi, lo, generation])
                })
                .collect();
            if !signatures.is_empty() {
                let rrsig = Rrset::with_rdata(
                    owner,
                    Rtype::RRSIG,
                    Class::IN,
                    Ttl::from_secs(3600),
                    signatures,
                );
                changeset.add(rrsig).map_err(fail)?;
            }
        }

        Ok(Signed {
            changeset,
            next_resign: jiff::Timestamp::from_second(2_000_000_000 - i64::from(generation))
                .map_err(|err| SignError(err.to_string()))?,
        })
    }
}

/// The test zone, signed with generation 101.
fn signed_contents() -> ZoneContents {
    let mut contents = contents(1);
    let signed = MockSigner::starting_at(100)
        .sign(&contents, SignScope::Full)
        .unwrap();
    contents.patch_in_place(&signed.changeset).unwrap();
    contents
}

/// The generations of the signatures at a name.
fn generations(contents: &ZoneContents, owner: &str) -> Vec<u8> {
    contents
        .rrset(&name(owner), Rtype::RRSIG)
        .map(|rrsig| rrsig.rdata().iter().map(|r| r.as_slice()[2]).collect())
        .unwrap_or_default()
}

/// All RRsets of a zone, in a stable order.
fn records(contents: &ZoneContents) -> Vec<String> {
    let mut records: Vec<String> = contents.rrsets().map(|r| format!("{r:?}")).collect();
    records.sort();
    records
}

//----------- MockForwarder ----------------------------------------------------

/// A forwarder whose primary never answers the first request.
#[derive(Default)]
struct MockForwarder {
    /// The forwarded message IDs, and the transports used.
    seen: Mutex<Vec<(u16, Transport)>>,
}

#[async_trait]
impl Forwarder for MockForwarder {
    async fn forward(
        &self,
        _primary: std::net::SocketAddr,
        transport: Transport,
        message: UpdateMessage,
    ) -> Result<UpdateResponse, ForwardError> {
        let first = {
            let mut seen = self.seen.lock().unwrap();
            seen.push((message.id, transport));
            seen.len() == 1
        };
        if first {
            std::future::pending::<()>().await;
        }
        Ok(UpdateResponse {
            id: message.id,
            rcode: Rcode::NOERROR,
            tsig: None,
        })
    }
}

//============ Scenarios =======================================================

#[tokio::test]
async fn batch_is_committed_once() {
    let journal = Arc::new(MemoryJournal::new(16));
    let (center, mut events) = primary(journal.clone());

    let first = submit(
        &center,
        message(1, vec![], vec![add("a.example.", Rtype::TXT, txt("a"))]),
    );
    // The second request relies on the first.
    let second = submit(
        &center,
        message(
            2,
            vec![prereq("a.example.", Class::ANY, Rtype::TXT, Rdata::empty())],
            vec![add("b.example.", Rtype::TXT, txt("b"))],
        ),
    );
    let third = submit(
        &center,
        message(
            3,
            vec![],
            vec![update_record("www.example.", Class::ANY, Rtype::ANY, 0, Rdata::empty())],
        ),
    );

    assert_eq!(rcode(first).await, Rcode::NOERROR);
    assert_eq!(rcode(second).await, Rcode::NOERROR);
    assert_eq!(rcode(third).await, Rcode::NOERROR);

    let contents = published(&center);
    assert_eq!(contents.serial(), Some(Serial(2)));
    assert!(contents.contains_name(&name("a.example.")));
    assert!(contents.contains_name(&name("b.example.")));
    assert!(!contents.contains_name(&name("www.example.")));

    assert_eq!(journal.len(&name("example.")), 1);
    assert_eq!(journal.last_serial(&name("example.")), Some(Serial(2)));
    assert_eq!(
        events.try_recv().unwrap(),
        ZoneEvent::Notify {
            zone: name("example."),
            serial: Serial(2)
        }
    );
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn consecutive_batches_chain() {
    let journal = Arc::new(MemoryJournal::new(16));
    let (center, _events) = primary(journal.clone());

    let first = submit(
        &center,
        message(1, vec![], vec![add("a.example.", Rtype::TXT, txt("a"))]),
    );
    assert_eq!(rcode(first).await, Rcode::NOERROR);
    let second = submit(
        &center,
        message(2, vec![], vec![add("a.example.", Rtype::TXT, txt("b"))]),
    );
    assert_eq!(rcode(second).await, Rcode::NOERROR);

    assert_eq!(published(&center).serial(), Some(Serial(3)));
    let history = journal.read_since(&name("example."), Serial(1)).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].serial_from(), Some(Serial(2)));
    assert_eq!(history[1].serial_to(), Some(Serial(3)));
}

#[tokio::test]
async fn failed_prerequisite_rejects_the_batch() {
    let journal = Arc::new(MemoryJournal::new(16));
    let (center, mut events) = primary(journal.clone());
    let before = published(&center);

    let first = submit(
        &center,
        message(1, vec![], vec![add("a.example.", Rtype::TXT, txt("a"))]),
    );
    let second = submit(
        &center,
        message(
            2,
            vec![prereq("missing.example.", Class::ANY, Rtype::A, Rdata::empty())],
            vec![add("b.example.", Rtype::TXT, txt("b"))],
        ),
    );
    let third = submit(
        &center,
        message(3, vec![], vec![add("c.example.", Rtype::TXT, txt("c"))]),
    );

    assert_eq!(rcode(first).await, Rcode::SERVFAIL);
    assert_eq!(rcode(second).await, Rcode::NXRRSET);
    assert_eq!(rcode(third).await, Rcode::SERVFAIL);

    assert!(Arc::ptr_eq(&before, &published(&center)));
    assert_eq!(published(&center).serial(), Some(Serial(1)));
    assert_eq!(journal.len(&name("example.")), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn journal_failure_leaves_the_zone_untouched() {
    let (center, mut events) = primary(Arc::new(FailingJournal));
    let before = published(&center);

    let rx = submit(
        &center,
        message(1, vec![], vec![add("a.example.", Rtype::TXT, txt("a"))]),
    );
    assert_eq!(rcode(rx).await, Rcode::SERVFAIL);

    let after = published(&center);
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.serial(), Some(Serial(1)));
    assert!(!after.contains_name(&name("a.example.")));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn no_op_updates_change_nothing() {
    let journal = Arc::new(MemoryJournal::new(16));
    let (center, mut events) = primary(journal.clone());
    let before = published(&center);

    let rx = submit(
        &center,
        message(
            1,
            vec![],
            vec![
                update_record("nope.example.", Class::ANY, Rtype::TXT, 0, Rdata::empty()),
                update_record("www.example.", Class::NONE, Rtype::TXT, 0, txt("other")),
                add("www.example.", Rtype::TXT, txt("www")),
            ],
        ),
    );
    assert_eq!(rcode(rx).await, Rcode::NOERROR);

    assert!(Arc::ptr_eq(&before, &published(&center)));
    assert_eq!(journal.len(&name("example.")), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn soa_regression_is_refused() {
    let (center, _events) = primary(Arc::new(MemoryJournal::new(16)));

    let rx = submit(
        &center,
        message(1, vec![], vec![add("example.", Rtype::SOA, soa_rdata(0))]),
    );
    assert_eq!(rcode(rx).await, Rcode::REFUSED);

    let rx = submit(
        &center,
        message(2, vec![], vec![add("example.", Rtype::SOA, soa_rdata(10))]),
    );
    assert_eq!(rcode(rx).await, Rcode::NOERROR);
    assert_eq!(published(&center).serial(), Some(Serial(10)));
}

#[tokio::test]
async fn flush_is_requested_when_configured() {
    let (center, mut events) = center(Arc::new(MemoryJournal::new(16)), None, None);
    let mut config = ZoneConfig::new(name("example."));
    config.flush_immediately = true;
    center.add_zone(config, Some(contents(1))).unwrap();

    let rx = submit(
        &center,
        message(1, vec![], vec![add("a.example.", Rtype::TXT, txt("a"))]),
    );
    assert_eq!(rcode(rx).await, Rcode::NOERROR);

    assert_eq!(
        events.try_recv().unwrap(),
        ZoneEvent::Flush {
            zone: name("example.")
        }
    );
    assert!(matches!(
        events.try_recv().unwrap(),
        ZoneEvent::Notify { .. }
    ));
}

#[tokio::test]
async fn intake_checks() {
    let (center, _events) = center(Arc::new(MemoryJournal::new(16)), None, None);
    center
        .add_zone(ZoneConfig::new(name("example.")), Some(contents(1)))
        .unwrap();
    let mut restricted = ZoneConfig::new(name("example.org."));
    restricted.update_keys = vec![name("key.example.org.")];
    center.add_zone(restricted, None).unwrap();

    let mut wrong_type = message(1, vec![], vec![]);
    wrong_type.zone_rtype = Rtype::A;
    assert_eq!(rcode(submit(&center, wrong_type)).await, Rcode::FORMERR);

    let mut unknown = message(2, vec![], vec![]);
    unknown.zone = name("example.net.");
    assert_eq!(rcode(submit(&center, unknown)).await, Rcode::NOTAUTH);

    let mut wrong_class = message(3, vec![], vec![]);
    wrong_class.zone_class = Class::CH;
    assert_eq!(rcode(submit(&center, wrong_class)).await, Rcode::NOTAUTH);

    let mut unsigned = message(4, vec![], vec![]);
    unsigned.zone = name("example.org.");
    assert_eq!(rcode(submit(&center, unsigned)).await, Rcode::NOTAUTH);

    // The key is accepted, but the zone has not been loaded yet.
    let mut signed = message(5, vec![], vec![]);
    signed.zone = name("EXAMPLE.org.");
    signed.tsig = Some(Tsig {
        key: name("key.example.org."),
        trailer: Default::default(),
    });
    let response = submit(&center, signed).await.unwrap();
    assert_eq!(response.rcode, Rcode::SERVFAIL);
    assert_eq!(response.id, 5);
    assert!(response.tsig.is_some());

    let outside = message(6, vec![], vec![add("www.example.net.", Rtype::TXT, txt("x"))]);
    assert_eq!(rcode(submit(&center, outside)).await, Rcode::NOTZONE);

    let malformed = message(7, vec![], vec![add("www.example.", Rtype::AXFR, Rdata::empty())]);
    assert_eq!(rcode(submit(&center, malformed)).await, Rcode::FORMERR);
}

#[tokio::test]
async fn failed_signed_commits_schedule_nothing() {
    let signer = Arc::new(MockSigner::default());
    let (center, mut events) = center(Arc::new(FailingJournal), Some(signer.clone()), None);
    let mut config = ZoneConfig::new(name("example."));
    config.dnssec = true;
    let zone = center.add_zone(config, Some(signed_contents())).unwrap();

    let rx = submit(
        &center,
        message(1, vec![], vec![add("a.example.", Rtype::TXT, txt("a"))]),
    );
    assert_eq!(rcode(rx).await, Rcode::SERVFAIL);

    // The zone was signed, but the result was never published.
    assert_eq!(signer.runs(), vec![false]);
    assert_eq!(zone.next_resign(), None);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn replaced_rrsets_take_the_new_ttl() {
    let journal = Arc::new(MemoryJournal::new(16));
    let (center, _events) = primary(journal.clone());

    let rx = submit(
        &center,
        message(
            1,
            vec![],
            vec![
                update_record("www.example.", Class::ANY, Rtype::TXT, 0, Rdata::empty()),
                update_record("www.example.", Class::IN, Rtype::TXT, 60, txt("www")),
            ],
        ),
    );
    assert_eq!(rcode(rx).await, Rcode::NOERROR);

    let www = published(&center)
        .rrset(&name("www.example."), Rtype::TXT)
        .cloned()
        .unwrap();
    assert_eq!(www.ttl(), Ttl::from_secs(60));
    assert_eq!(www.rdata(), &[txt("www")]);
    assert_eq!(journal.last_serial(&name("example.")), Some(Serial(2)));
}

#[tokio::test]
async fn key_changes_resign_the_whole_zone() {
    let signer = Arc::new(MockSigner::default());
    let journal = Arc::new(MemoryJournal::new(16));
    let (center, mut events) = center(journal.clone(), Some(signer.clone()), None);
    let mut config = ZoneConfig::new(name("example."));
    config.dnssec = true;
    center.add_zone(config, Some(signed_contents())).unwrap();
    let before = published(&center);

    let rx = submit(
        &center,
        message(1, vec![], vec![add("example.", Rtype::DNSKEY, Rdata::from(b"key".as_slice()))]),
    );
    assert_eq!(rcode(rx).await, Rcode::NOERROR);
    assert_eq!(signer.runs(), vec![true]);

    // Every RRset carries a new signature.
    let after = published(&center);
    for node in after.nodes() {
        let owner = node.owner().to_string();
        let covered = node.rrsets().iter().filter(|r| r.rtype() != Rtype::RRSIG).count();
        let generations = generations(&after, &owner);
        assert_eq!(generations.len(), covered, "{owner}");
        assert!(generations.iter().all(|&g| g == 1), "{owner}");
    }

    // The journaled changeset leads from the old contents to the new ones.
    let history = journal.read_since(&name("example."), Serial(1)).unwrap();
    assert_eq!(history.len(), 1);
    let replayed = before.patched(&history[0]).unwrap();
    assert_eq!(records(&replayed), records(&after));

    assert!(matches!(events.try_recv().unwrap(), ZoneEvent::Resign { .. }));
    assert!(matches!(events.try_recv().unwrap(), ZoneEvent::Notify { .. }));
}

#[tokio::test]
async fn other_changes_are_signed_incrementally() {
    let signer = Arc::new(MockSigner::default());
    let journal = Arc::new(MemoryJournal::new(16));
    let (center, _events) = center(journal.clone(), Some(signer.clone()), None);
    let mut config = ZoneConfig::new(name("example."));
    config.dnssec = true;
    center.add_zone(config, Some(signed_contents())).unwrap();
    let before = published(&center);

    let rx = submit(
        &center,
        message(1, vec![], vec![add("a.example.", Rtype::TXT, txt("a"))]),
    );
    assert_eq!(rcode(rx).await, Rcode::NOERROR);
    assert_eq!(signer.runs(), vec![false]);

    let after = published(&center);
    assert_eq!(generations(&after, "a.example."), vec![1]);
    // The SOA changed, so the apex is signed again.
    assert_eq!(generations(&after, "example."), vec![1, 1]);
    // Untouched names keep their signatures.
    assert_eq!(generations(&after, "www.example."), vec![101]);

    let history = journal.read_since(&name("example."), Serial(1)).unwrap();
    let replayed = before.patched(&history[0]).unwrap();
    assert_eq!(records(&replayed), records(&after));
}

#[tokio::test(start_paused = true)]
async fn secondaries_forward_each_request() {
    let forwarder = Arc::new(MockForwarder::default());
    let (center, _events) = center(
        Arc::new(MemoryJournal::new(16)),
        None,
        Some(forwarder.clone()),
    );
    let mut config = ZoneConfig::new(name("example."));
    config.primary = Some("192.0.2.1:53".parse().unwrap());
    center.add_zone(config, None).unwrap();

    let tsig = Tsig {
        key: name("key.example."),
        trailer: bytes::Bytes::from_static(b"trailer"),
    };
    let mut first = message(7, vec![], vec![add("a.example.", Rtype::TXT, txt("a"))]);
    first.tsig = Some(tsig.clone());
    let mut second = message(8, vec![], vec![add("b.example.", Rtype::TXT, txt("b"))]);
    second.tsig = Some(tsig.clone());

    let first = submit_over(&center, first, Transport::Datagram);
    let second = submit_over(&center, second, Transport::Stream);

    // The primary never answers the first request.
    let first = first.await.unwrap();
    assert_eq!(first.rcode, Rcode::SERVFAIL);
    assert_eq!(first.id, 7);

    let second = second.await.unwrap();
    assert_eq!(second.rcode, Rcode::NOERROR);
    assert_eq!(second.id, 8);
    assert_eq!(second.tsig, Some(tsig));

    let seen = forwarder.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_ne!(seen[0].0, seen[1].0);
    assert_eq!(seen[0].1, Transport::Datagram);
    assert_eq!(seen[1].1, Transport::Stream);
}
