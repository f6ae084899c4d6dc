use big_collections::{BigList, Config, Error};
use test_log::test;

#[test]
fn list_append_get_reopen() -> big_collections::Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let mut list = BigList::open(dir.path())?;
        for i in 0..10_000i64 {
            list.push(i)?;
        }

        assert_eq!(10_000, list.len());
        assert_eq!(0, list.get(0)?);
        assert_eq!(9_999, list.get(9_999)?);
        assert_eq!(5_000, list.get(5_000)?);

        list.commit()?;
    }

    {
        let mut list = BigList::<i64>::open(dir.path())?;
        assert_eq!(10_000, list.len());
        assert_eq!(0, list.get(0)?);
        assert_eq!(9_999, list.get(9_999)?);
        assert_eq!(5_000, list.get(5_000)?);
    }

    Ok(())
}

#[test]
fn list_delete_range() -> big_collections::Result<()> {
    let dir = tempfile::tempdir()?;

    let mut list = Config::new(dir.path()).chunk_size(64).open_list::<i64>()?;
    for i in 0..10_000 {
        list.push(i)?;
    }

    list.delete_range(100, 200, 1)?;

    assert_eq!(9_900, list.len());
    assert_eq!(99, list.get(99)?);
    assert_eq!(200, list.get(100)?);
    assert_eq!(9_999, list.get(9_899)?);

    let chunk = list.chunk_size();
    for &len in list.segment_lens() {
        assert!(len >= chunk / 2, "segment of length {len} below chunk/2");
        assert!(len <= 2 * chunk, "segment of length {len} above 2*chunk");
    }

    Ok(())
}

#[test]
fn list_delete_range_spanning_segments() -> big_collections::Result<()> {
    let dir = tempfile::tempdir()?;

    let mut list = Config::new(dir.path()).chunk_size(16).open_list::<i64>()?;
    for i in 0..1_000 {
        list.push(i)?;
    }

    // Interior span crossing many segments
    list.delete_range(123, 456, 1)?;
    assert_eq!(667, list.len());
    assert_eq!(122, list.get(122)?);
    assert_eq!(456, list.get(123)?);

    // Prefix and suffix spans
    list.delete_range(0, 10, 1)?;
    assert_eq!(456, list.get(113)?);
    let len = list.len();
    list.delete_range(len - 10, len, 1)?;
    assert_eq!(647, list.len());

    let chunk = list.chunk_size();
    for &len in list.segment_lens() {
        assert!(len >= chunk / 2, "segment of length {len} below chunk/2");
        assert!(len <= 2 * chunk, "segment of length {len} above 2*chunk");
    }

    // Strided deletion falls back to element-wise removal
    let before: Vec<i64> = list.iter().collect::<big_collections::Result<_>>()?;
    list.delete_range(0, 20, 2)?;
    let after: Vec<i64> = list.iter().collect::<big_collections::Result<_>>()?;
    let expected: Vec<i64> = before
        .iter()
        .enumerate()
        .filter(|(i, _)| *i >= 20 || i % 2 == 1)
        .map(|(_, x)| *x)
        .collect();
    assert_eq!(expected, after);

    assert!(matches!(
        list.delete_range(0, 1, 0),
        Err(Error::Unsupported(_))
    ));

    Ok(())
}

#[test]
fn list_rebalance_under_front_inserts() -> big_collections::Result<()> {
    let dir = tempfile::tempdir()?;

    let mut list = Config::new(dir.path()).chunk_size(16).open_list::<i64>()?;

    for i in 0..(2 * 16 + 5) {
        list.insert(0, i64::from(i))?;

        for &len in list.segment_lens() {
            assert!(len <= 32, "segment of length {len} above 2*chunk");
        }
    }

    assert_eq!(37, list.len());
    assert_eq!(36, list.get(0)?);
    assert_eq!(0, list.get(36)?);

    Ok(())
}

#[test]
fn list_set_and_remove() -> big_collections::Result<()> {
    let dir = tempfile::tempdir()?;

    let mut list = Config::new(dir.path()).chunk_size(16).open_list::<i64>()?;
    for i in 0..100 {
        list.push(i)?;
    }

    assert_eq!(50, list.set(50, -1)?);
    assert_eq!(-1, list.get(50)?);

    assert_eq!(-1, list.remove(50)?);
    assert_eq!(51, list.get(50)?);
    assert_eq!(99, list.len());

    assert!(matches!(list.get(99), Err(Error::IndexOutOfRange)));
    assert!(matches!(list.remove(1_000), Err(Error::IndexOutOfRange)));

    Ok(())
}

#[test]
fn list_extend_and_iterate() -> big_collections::Result<()> {
    let dir = tempfile::tempdir()?;

    let mut list = Config::new(dir.path()).chunk_size(32).open_list::<i64>()?;
    list.push(-1)?;
    list.extend(0..5_000)?;

    assert_eq!(5_001, list.len());
    assert_eq!(-1, list.get(0)?);
    assert_eq!(4_999, list.get(5_000)?);

    let items: Vec<i64> = list.iter().collect::<big_collections::Result<_>>()?;
    assert_eq!(-1, items[0]);
    assert!(items[1..].iter().copied().eq(0..5_000));

    let tail: Vec<i64> = list
        .iter_range(4_998, 5_001)
        .collect::<big_collections::Result<_>>()?;
    assert_eq!(vec![4_997, 4_998, 4_999], tail);

    let reversed: Vec<i64> = list.iter_rev().collect::<big_collections::Result<_>>()?;
    assert_eq!(items.iter().rev().copied().collect::<Vec<_>>(), reversed);

    let strided: Vec<i64> = list
        .iter_slice(1, 11, 3)
        .collect::<big_collections::Result<_>>()?;
    assert_eq!(vec![0, 3, 6, 9], strided);

    let strided_rev: Vec<i64> = list
        .iter_slice(1, 11, -3)
        .collect::<big_collections::Result<_>>()?;
    assert_eq!(vec![9, 6, 3, 0], strided_rev);

    Ok(())
}

#[test]
fn list_incremental_extend() -> big_collections::Result<()> {
    let dir = tempfile::tempdir()?;

    let mut list = Config::new(dir.path()).chunk_size(32).open_list::<i64>()?;

    let mut job = list.begin_extend(0..1_000);
    let mut steps = 0;
    while job.step()? {
        steps += 1;
    }
    job.finish()?;

    assert!(steps > 1, "bulk import should take several steps");
    assert_eq!(1_000, list.len());
    assert_eq!(999, list.get(999)?);

    // Cancellation mid-way still leaves coherent state
    let mut job = list.begin_extend(1_000..2_000);
    job.step()?;
    job.step()?;
    drop(job);

    let n = list.len();
    assert!(n > 1_000, "cancelled import should keep completed segments");
    for rank in 0..n {
        assert_eq!(i64::try_from(rank).unwrap(), list.get(rank)?);
    }

    Ok(())
}

#[test]
fn list_reverse() -> big_collections::Result<()> {
    let dir = tempfile::tempdir()?;

    let mut list = Config::new(dir.path()).chunk_size(16).open_list::<i64>()?;
    for i in 0..500 {
        list.push(i)?;
    }

    list.reverse()?;

    assert_eq!(499, list.get(0)?);
    assert_eq!(0, list.get(499)?);
    assert_eq!(499 - 123, list.get(123)?);

    Ok(())
}

#[test]
fn list_clear_keeps_minting_fresh_ids() -> big_collections::Result<()> {
    let dir = tempfile::tempdir()?;

    let mut list = Config::new(dir.path()).chunk_size(16).open_list::<i64>()?;
    for i in 0..100 {
        list.push(i)?;
    }

    list.clear()?;
    assert_eq!(0, list.len());
    assert!(list.is_empty());

    list.push(7)?;
    assert_eq!(7, list.get(0)?);
    assert_eq!(1, list.len());

    Ok(())
}

#[test]
fn list_commit_is_idempotent() -> big_collections::Result<()> {
    use std::collections::BTreeMap;

    fn snapshot(dir: &std::path::Path) -> std::io::Result<BTreeMap<String, Vec<u8>>> {
        let mut out = BTreeMap::new();
        for entry in std::fs::read_dir(dir.join("list"))? {
            let entry = entry?;
            out.insert(
                entry.file_name().to_string_lossy().into_owned(),
                std::fs::read(entry.path())?,
            );
        }
        Ok(out)
    }

    let dir = tempfile::tempdir()?;

    let mut list = Config::new(dir.path()).chunk_size(16).open_list::<i64>()?;
    for i in 0..300 {
        list.push(i)?;
    }

    list.commit()?;
    let first = snapshot(dir.path())?;

    list.commit()?;
    let second = snapshot(dir.path())?;

    assert_eq!(first, second);

    Ok(())
}
