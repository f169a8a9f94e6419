use super::*;

use std::fs;
use std::net::IpAddr;

use camino::Utf8PathBuf;
use zonewright_zonefile::Record;

const AT_ZONE: &str = "\
$ORIGIN example.com.
$TTL 1H
@ IN SOA ns hostmaster 1282630067 4H 1H 1W 2H
    IN NS ns
ns IN A 192.0.2.53
loop IN A 127.0.0.1
     IN AAAA ::1
_acme-challenge.zot IN TXT \"placeholder\"
_acme-challenge.zot IN TXT \"realtoken\"
";

const MX_ZONE: &str = "\
mx.example.org. IN SOA ns.mx.example.org. host.mx.example.org. 1282630067 4H 1H 1W 2H
mx.example.org. IN NS ns.mx.example.org.
";

const TOKEN: &str = "fake/XKo9kaBlVnj9q0XWAWdoSYEPCOrhiZk3ztoBHx5c3O6X";

fn write_zone(dir: &tempfile::TempDir, name: &str, contents: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("UTF-8 temp path");
    fs::write(&path, contents).unwrap();
    path
}

fn ip(addr: &str) -> IpAddr {
    addr.parse().unwrap()
}

/// Read the records back, with inherited owners resolved.
fn read_records(path: &Utf8PathBuf) -> Vec<Record> {
    let data = fs::read(path).unwrap();
    let mut prev_owner = String::new();
    let mut records = Vec::new();
    for entry in Zonefile::parse_bytes(&data).unwrap().into_entries() {
        if let Entry::Record(mut record) = entry {
            if record.owner.is_empty() {
                record.owner.clone_from(&prev_owner);
            } else {
                prev_owner.clone_from(&record.owner);
            }
            records.push(record);
        }
    }
    records
}

fn records_at(records: &[Record], owner: &str) -> Vec<(String, Vec<String>)> {
    records
        .iter()
        .filter(|r| r.owner == owner)
        .map(|r| (r.rtype.clone(), r.values.clone()))
        .collect()
}

fn soa_serial(records: &[Record]) -> u64 {
    let soa = records
        .iter()
        .find(|r| r.rtype_code() == Some(Rtype::SOA))
        .expect("no SOA record");
    soa.values[2].parse().expect("serial is numeric")
}

#[test]
fn open_detects_origins() {
    let dir = tempfile::tempdir().unwrap();
    let at = write_zone(&dir, "at.zone", AT_ZONE);
    let mx = write_zone(&dir, "mx.zone", MX_ZONE);

    let manager = ZoneManager::open(&[at, mx]).unwrap();
    let origins: Vec<_> = manager.origins().collect();
    assert_eq!(origins, vec!["example.com.", "mx.example.org."]);
}

#[test]
fn open_rejects_bad_zones() {
    let dir = tempfile::tempdir().unwrap();

    let missing = Utf8PathBuf::from_path_buf(dir.path().join("nope.zone")).unwrap();
    assert!(matches!(
        ZoneManager::open(&[missing]),
        Err(ZoneError::Io(_))
    ));

    let no_soa = write_zone(&dir, "no-soa.zone", "$ORIGIN bad.example.\nwww IN A 192.0.2.1\n");
    assert!(matches!(
        ZoneManager::open(&[no_soa]),
        Err(ZoneError::SoaNotFound)
    ));

    let relative_soa = write_zone(&dir, "rel.zone", "@ IN SOA ns host 1 4H 1H 1W 2H\n");
    assert!(matches!(
        ZoneManager::open(&[relative_soa]),
        Err(ZoneError::UnknownOrigin)
    ));
}

#[tokio::test]
async fn ddns_replaces_address_set() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    let changed = manager
        .update_ddns_address("loop.example.com.", &[ip("1.2.3.4"), ip("2001:db8::1")])
        .await
        .unwrap();
    assert!(changed);

    let records = read_records(&path);
    assert_eq!(
        records_at(&records, "loop"),
        vec![
            ("A".to_string(), vec!["1.2.3.4".to_string()]),
            ("AAAA".to_string(), vec!["2001:db8::1".to_string()]),
        ]
    );

    // Everything else survives, and the serial moved forward.
    assert_eq!(
        records_at(&records, "ns"),
        vec![("A".to_string(), vec!["192.0.2.53".to_string()])]
    );
    assert_eq!(records_at(&records, "_acme-challenge.zot").len(), 2);
    assert!(soa_serial(&records) > 1_282_630_067);
}

#[tokio::test]
async fn ddns_v4_only_keeps_v6() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    manager
        .update_ddns_address("loop.example.com.", &[ip("9.9.9.9")])
        .await
        .unwrap();

    let records = read_records(&path);
    assert_eq!(
        records_at(&records, "loop"),
        vec![
            ("A".to_string(), vec!["9.9.9.9".to_string()]),
            ("AAAA".to_string(), vec!["::1".to_string()]),
        ]
    );
}

#[tokio::test]
async fn ddns_sorts_addresses_within_family() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    manager
        .update_ddns_address(
            "loop.example.com.",
            &[ip("10.0.0.9"), ip("2001:db8::2"), ip("10.0.0.1"), ip("2001:db8::1")],
        )
        .await
        .unwrap();

    let records = read_records(&path);
    assert_eq!(
        records_at(&records, "loop"),
        vec![
            ("A".to_string(), vec!["10.0.0.1".to_string()]),
            ("A".to_string(), vec!["10.0.0.9".to_string()]),
            ("AAAA".to_string(), vec!["2001:db8::1".to_string()]),
            ("AAAA".to_string(), vec!["2001:db8::2".to_string()]),
        ]
    );
}

#[tokio::test]
async fn ddns_appends_at_new_owner() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    let changed = manager
        .update_ddns_address("fresh.example.com.", &[ip("1.2.3.4")])
        .await
        .unwrap();
    assert!(changed);

    let records = read_records(&path);
    assert_eq!(
        records_at(&records, "fresh"),
        vec![("A".to_string(), vec!["1.2.3.4".to_string()])]
    );
}

#[tokio::test]
async fn ddns_without_change_leaves_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    let changed = manager
        .update_ddns_address("loop.example.com.", &[ip("127.0.0.1"), ip("::1")])
        .await
        .unwrap();
    assert!(!changed);
    assert_eq!(fs::read_to_string(&path).unwrap(), AT_ZONE);
}

#[tokio::test]
async fn ddns_unknown_zone() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    let err = manager
        .update_ddns_address("host.other.net.", &[ip("1.2.3.4")])
        .await
        .unwrap_err();
    assert!(matches!(err, ZoneError::ZoneNotFound { .. }));
}

#[tokio::test]
async fn acme_replaces_every_txt_at_owner() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    let changed = manager
        .update_acme_challenge("zot.example.com.", TOKEN, "")
        .await
        .unwrap();
    assert!(changed);

    let records = read_records(&path);
    assert_eq!(
        records_at(&records, "_acme-challenge.zot"),
        vec![("TXT".to_string(), vec![TOKEN.to_string()])]
    );
}

#[tokio::test]
async fn acme_cleanup_replaces_only_the_matching_txt() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    let changed = manager
        .update_acme_challenge("zot.example.com.", "", "realtoken")
        .await
        .unwrap();
    assert!(changed);

    let records = read_records(&path);
    assert_eq!(
        records_at(&records, "_acme-challenge.zot"),
        vec![
            ("TXT".to_string(), vec!["placeholder".to_string()]),
            ("TXT".to_string(), vec!["placeholder".to_string()]),
        ]
    );
}

#[tokio::test]
async fn acme_creates_challenge_at_new_owner() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    manager
        .update_acme_challenge("fresh.example.com.", TOKEN, "")
        .await
        .unwrap();

    let records = read_records(&path);
    assert_eq!(
        records_at(&records, "_acme-challenge.fresh"),
        vec![("TXT".to_string(), vec![TOKEN.to_string()])]
    );
}

#[tokio::test]
async fn zm_update_replaces_typed_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    // Record types are accepted case-insensitively.
    let changed = manager
        .update_record("loop.example.com.", "a", &["192.0.2.99".to_string()])
        .await
        .unwrap();
    assert!(changed);

    let records = read_records(&path);
    assert_eq!(
        records_at(&records, "loop"),
        vec![
            ("A".to_string(), vec!["192.0.2.99".to_string()]),
            ("AAAA".to_string(), vec!["::1".to_string()]),
        ]
    );
}

#[tokio::test]
async fn zm_update_handles_multi_field_rdata() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(
        &dir,
        "mx.zone",
        "$ORIGIN example.com.\n\
         @ IN SOA ns hostmaster 1282630067 4H 1H 1W 2H\n\
         @ IN MX 10 mail.old.example.\n",
    );
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    let changed = manager
        .update_record(
            "example.com.",
            "MX",
            &[
                "10 mail.one.example.".to_string(),
                "20 mail.two.example.".to_string(),
            ],
        )
        .await
        .unwrap();
    assert!(changed);

    // Each value string becomes one record with its rdata split into fields.
    let records = read_records(&path);
    let mx: Vec<_> = records_at(&records, "@")
        .into_iter()
        .filter(|(rtype, _)| rtype == "MX")
        .collect();
    assert_eq!(
        mx,
        vec![
            (
                "MX".to_string(),
                vec!["10".to_string(), "mail.one.example.".to_string()]
            ),
            (
                "MX".to_string(),
                vec!["20".to_string(), "mail.two.example.".to_string()]
            ),
        ]
    );
}

#[tokio::test]
async fn zm_update_keeps_txt_values_as_one_token() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    let changed = manager
        .update_record(
            "_acme-challenge.zot.example.com.",
            "TXT",
            &["hello world".to_string()],
        )
        .await
        .unwrap();
    assert!(changed);

    let records = read_records(&path);
    assert_eq!(
        records_at(&records, "_acme-challenge.zot"),
        vec![("TXT".to_string(), vec!["hello world".to_string()])]
    );
}

#[tokio::test]
async fn zm_update_requires_an_existing_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    let err = manager
        .update_record("loop.example.com.", "MX", &["10 mail".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ZoneError::RecordNotFound { .. }));
    assert_eq!(fs::read_to_string(&path).unwrap(), AT_ZONE);
}

#[tokio::test]
async fn zm_update_rejects_unknown_types() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    let err = manager
        .update_record("loop.example.com.", "BOGUS", &["x".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ZoneError::UnknownRecordType { .. }));
}

#[tokio::test]
async fn origin_drift_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = ZoneManager::open(std::slice::from_ref(&path)).unwrap();

    // Someone rewrites the zone for a different origin behind our back.
    fs::write(
        &path,
        "$ORIGIN other.example.\n@ IN SOA ns host 1 4H 1H 1W 2H\n",
    )
    .unwrap();

    let err = manager
        .update_ddns_address("loop.example.com.", &[ip("1.2.3.4")])
        .await
        .unwrap_err();
    assert!(matches!(err, ZoneError::OriginChanged { .. }));
}

#[tokio::test]
async fn dispatch_prefers_longest_origin() {
    let dir = tempfile::tempdir().unwrap();
    let parent = write_zone(&dir, "parent.zone", AT_ZONE);
    let child = write_zone(
        &dir,
        "child.zone",
        "$ORIGIN sub.example.com.\n@ IN SOA ns hostmaster 1282630067 4H 1H 1W 2H\n",
    );
    let manager = ZoneManager::open(&[parent.clone(), child.clone()]).unwrap();

    manager
        .update_ddns_address("host.sub.example.com.", &[ip("1.2.3.4")])
        .await
        .unwrap();

    assert_eq!(fs::read_to_string(&parent).unwrap(), AT_ZONE);
    let records = read_records(&child);
    assert_eq!(
        records_at(&records, "host"),
        vec![("A".to_string(), vec!["1.2.3.4".to_string()])]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_updates_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_zone(&dir, "at.zone", AT_ZONE);
    let manager = std::sync::Arc::new(ZoneManager::open(std::slice::from_ref(&path)).unwrap());

    let one_ip = [ip("198.51.100.1")];
    let two_ip = [ip("198.51.100.2")];
    let (one, two) = tokio::join!(
        manager.update_ddns_address("one.example.com.", &one_ip),
        manager.update_ddns_address("two.example.com.", &two_ip),
    );
    assert!(one.unwrap());
    assert!(two.unwrap());

    // Both edits landed; neither clobbered the other.
    let records = read_records(&path);
    assert_eq!(
        records_at(&records, "one"),
        vec![("A".to_string(), vec!["198.51.100.1".to_string()])]
    );
    assert_eq!(
        records_at(&records, "two"),
        vec![("A".to_string(), vec!["198.51.100.2".to_string()])]
    );
}

#[test]
fn rendered_entries_parse_back_unchanged() {
    let (entries, origin) = load_entries(AT_ZONE.as_bytes()).unwrap();
    assert_eq!(origin, "example.com.");

    let mut plain = Vec::new();
    render_entries(&entries, &mut plain).unwrap();
    let (reparsed, reparsed_origin) = load_entries(&plain).unwrap();

    assert_eq!(reparsed_origin, origin);
    assert_eq!(reparsed, entries);
}
