use big_collections::{BigList, Config, Error};
use test_log::test;

fn seg_count(dir: &std::path::Path) -> std::io::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir.join("list"))? {
        let entry = entry?;
        if entry.path().extension().is_some_and(|ext| ext == "seg") {
            count += 1;
        }
    }
    Ok(count)
}

#[test]
fn striped_list_spreads_segments_and_reopens_permuted() -> big_collections::Result<()> {
    let dir = tempfile::tempdir()?;
    let root_a = dir.path().join("a");
    let root_b = dir.path().join("b");

    {
        let mut list = Config::striped([&root_a, &root_b])
            .chunk_size(256)
            .open_list::<i64>()?;

        list.extend(0..200_000)?;
        assert_eq!(200_000, list.len());
        list.commit()?;
    }

    assert!(seg_count(&root_a)? > 0, "root a should hold segments");
    assert!(seg_count(&root_b)? > 0, "root b should hold segments");

    {
        // Reopening with the roots permuted is fine; contents are unchanged
        let mut list = BigList::<i64>::open_striped([&root_b, &root_a])?;
        assert_eq!(200_000, list.len());

        assert_eq!(0, list.get(0)?);
        assert_eq!(123_456, list.get(123_456)?);
        assert_eq!(199_999, list.get(199_999)?);

        let mut expected = 0;
        for item in list.iter() {
            assert_eq!(expected, item?);
            expected += 1;
        }
        assert_eq!(200_000, expected);
    }

    Ok(())
}

#[test]
fn striped_list_rejects_foreign_root_set() -> big_collections::Result<()> {
    let dir = tempfile::tempdir()?;
    let root_a = dir.path().join("a");
    let root_b = dir.path().join("b");
    let root_c = dir.path().join("c");

    {
        let mut list = BigList::open_striped([&root_a, &root_b])?;
        list.extend(0..10_000i64)?;
        list.commit()?;
    }

    // A different set sharing one root must be refused
    assert!(matches!(
        BigList::<i64>::open_striped([&root_a, &root_c]),
        Err(Error::InconsistentRootSet)
    ));

    // So must dropping down to a subset
    assert!(matches!(
        BigList::<i64>::open_striped([&root_a]),
        Err(Error::InconsistentRootSet),
    ));

    Ok(())
}

#[test]
fn striped_list_survives_mutation_after_reopen() -> big_collections::Result<()> {
    let dir = tempfile::tempdir()?;
    let root_a = dir.path().join("a");
    let root_b = dir.path().join("b");

    {
        let mut list = Config::striped([&root_a, &root_b])
            .chunk_size(64)
            .open_list::<i64>()?;
        list.extend(0..5_000)?;
        list.commit()?;
    }

    {
        let mut list = BigList::<i64>::open_striped([&root_b, &root_a])?;

        list.delete_range(1_000, 2_000, 1)?;
        list.push(-1)?;
        assert_eq!(4_001, list.len());
        assert_eq!(2_000, list.get(1_000)?);
        assert_eq!(-1, list.get(4_000)?);

        list.commit()?;
    }

    {
        let mut list = BigList::<i64>::open_striped([&root_a, &root_b])?;
        assert_eq!(4_001, list.len());
        assert_eq!(999, list.get(999)?);
        assert_eq!(2_000, list.get(1_000)?);
    }

    Ok(())
}
