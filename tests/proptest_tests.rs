//! Property-based tests for path validation and archive round trips.

use poaf::{open_streaming, FileType, Writer, WriterOptions};
use proptest::prelude::*;
use std::io::Cursor;

/// 1-4 path components, each short and alphanumeric-ish, never producing a
/// name that `validate_name` would reject.
fn valid_name_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-zA-Z0-9][a-zA-Z0-9_-]{0,9}", 1..4).prop_map(|parts| parts.join("/"))
}

fn file_type_strategy() -> impl Strategy<Value = FileType> {
    prop_oneof![Just(FileType::RegularFile), Just(FileType::PosixExecutable), Just(FileType::Directory)]
}

fn item_strategy() -> impl Strategy<Value = (String, FileType, Vec<u8>)> {
    (valid_name_strategy(), file_type_strategy(), proptest::collection::vec(any::<u8>(), 0..2000))
        .prop_map(|(name, file_type, contents)| if file_type == FileType::Directory { (name, file_type, Vec::new()) } else { (name, file_type, contents) })
}

fn dedup_by_name(items: Vec<(String, FileType, Vec<u8>)>) -> Vec<(String, FileType, Vec<u8>)> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|(name, ..)| seen.insert(name.clone())).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every name `validate_name` would accept survives a write/read round
    /// trip through the archive with its original bytes intact.
    #[test]
    fn arbitrary_items_round_trip_through_streaming_reader(
        raw_items in proptest::collection::vec(item_strategy(), 0..12),
        split_threshold in 64u64..4096,
    ) {
        let items = dedup_by_name(raw_items);
        let options = WriterOptions { stream_split_threshold: split_threshold, ..WriterOptions::default() };

        let mut buf = Vec::new();
        let mut w = Writer::new(&mut buf, options).unwrap();
        for (name, file_type, contents) in &items {
            w.add(name, *file_type, Cursor::new(contents.clone())).unwrap();
        }
        w.close().unwrap();

        let mut r = open_streaming(Cursor::new(buf)).unwrap();
        for (name, file_type, contents) in &items {
            let mut item = r.next().unwrap().expect("archive has one item per entry written");
            prop_assert_eq!(&item.name, name);
            prop_assert_eq!(item.file_type, *file_type);

            let mut observed = Vec::new();
            while !item.done {
                let chunk = r.read_from_item(&mut item, None).unwrap();
                if chunk.is_empty() && item.done {
                    break;
                }
                observed.extend(chunk);
            }
            prop_assert_eq!(&observed, contents);
        }
        prop_assert!(r.next().unwrap().is_none());
        r.close().unwrap();
    }

    /// A lower split threshold never changes what comes back out, only how
    /// many DEFLATE streams the Data Region is made of internally.
    #[test]
    fn split_threshold_does_not_affect_observed_contents(
        contents in proptest::collection::vec(any::<u8>(), 0..6000),
        split_threshold in 16u64..512,
    ) {
        let options = WriterOptions { stream_split_threshold: split_threshold, ..WriterOptions::default() };
        let mut buf = Vec::new();
        let mut w = Writer::new(&mut buf, options).unwrap();
        w.add("f.bin", FileType::RegularFile, Cursor::new(contents.clone())).unwrap();
        w.close().unwrap();

        let mut r = open_streaming(Cursor::new(buf)).unwrap();
        let mut item = r.next().unwrap().unwrap();
        let mut observed = Vec::new();
        while !item.done {
            let chunk = r.read_from_item(&mut item, None).unwrap();
            if chunk.is_empty() && item.done {
                break;
            }
            observed.extend(chunk);
        }
        prop_assert_eq!(observed, contents);
        r.close().unwrap();
    }

    /// Names containing NUL or other forbidden control bytes are always
    /// rejected by `Writer::add`, never silently accepted.
    #[test]
    fn names_with_forbidden_bytes_are_rejected(
        prefix in "[a-zA-Z0-9]{0,5}",
        suffix in "[a-zA-Z0-9]{0,5}",
    ) {
        let name = format!("{prefix}\x01{suffix}");
        let mut buf = Vec::new();
        let mut w = Writer::new(&mut buf, WriterOptions::default()).unwrap();
        let result = w.add(&name, FileType::RegularFile, Cursor::new(Vec::new()));
        prop_assert!(result.is_err());
    }

    /// Absolute names (a leading '/') are always rejected.
    #[test]
    fn absolute_names_are_rejected(path in "/[a-zA-Z0-9/]{1,20}") {
        let mut buf = Vec::new();
        let mut w = Writer::new(&mut buf, WriterOptions::default()).unwrap();
        let result = w.add(&path, FileType::RegularFile, Cursor::new(Vec::new()));
        prop_assert!(result.is_err());
    }
}
