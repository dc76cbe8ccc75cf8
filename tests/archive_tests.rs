//! Round-trip tests run against both container backends.

use std::sync::Arc;

use alembic_core::abc::{IArchive, OArchive, ReadOptions, WriteOptions, WriteStats};
use alembic_core::core::{ArraySample, ErrorPolicy, MetaData, SampleSelector, ScalarSample, TimeSampling};
use alembic_core::memory::MemoryStore;
use alembic_core::util::{DataType, Dimensions, ErrorKind, Result};

use tempfile::NamedTempFile;

#[derive(Clone, Copy, Debug)]
enum Backend {
    Ogawa,
    Memory,
}

const BACKENDS: [Backend; 2] = [Backend::Ogawa, Backend::Memory];

/// A closed archive reopened for reading; keeps its temp file alive.
struct Reopened {
    archive: IArchive,
    stats: WriteStats,
    _file: Option<NamedTempFile>,
}

fn round_trip(
    backend: Backend,
    options: WriteOptions,
    read: ReadOptions,
    build: impl FnOnce(&mut OArchive) -> Result<()>,
) -> Reopened {
    match backend {
        Backend::Ogawa => {
            let file = NamedTempFile::new().expect("Failed to create temp file");
            let mut out = OArchive::create_with(file.path(), options).expect("Failed to create archive");
            build(&mut out).expect("Failed to build archive");
            let stats = out.stats();
            out.close().expect("Failed to close archive");
            let archive = IArchive::open_with(file.path(), read).expect("Failed to open archive");
            Reopened { archive, stats, _file: Some(file) }
        }
        Backend::Memory => {
            let store = MemoryStore::new();
            let writer = store.writer().expect("Failed to create writer");
            let mut out = OArchive::with_writer(Box::new(writer), "memory", options);
            build(&mut out).expect("Failed to build archive");
            let stats = out.stats();
            out.close().expect("Failed to close archive");
            let reader = store.reader(read.num_cursors).expect("Failed to open store");
            let archive = IArchive::from_reader(Arc::new(reader), "memory", read).expect("Failed to open archive");
            Reopened { archive, stats, _file: None }
        }
    }
}

fn two_cursors() -> ReadOptions {
    ReadOptions { num_cursors: 2, ..Default::default() }
}

/// Writes `/A` with a three-sample `pos` array at 24 fps.
fn write_pos(out: &mut OArchive) -> Result<()> {
    let ts = out.add_time_sampling(TimeSampling::uniform(1.0 / 24.0, 0.0)?)?;
    let a = out.create_child(out.top(), "A", MetaData::new())?;
    let props = out.properties(a)?;
    let md: MetaData = [(MetaData::INTERPRETATION_KEY, "point")].into_iter().collect();
    let pos = out.create_array_property(props, "pos", md, DataType::VEC3F, ts)?;
    out.set_array_sample(pos, 0, 0.0, &ArraySample::from_values(&[0.0f32; 3], 3)?)?;
    out.set_array_from_previous(pos, 1, 1.0 / 24.0)?;
    out.set_array_sample(pos, 2, 2.0 / 24.0, &ArraySample::from_values(&[1.0f32; 3], 3)?)?;
    Ok(())
}

#[test]
fn test_pos_scenario() {
    for backend in BACKENDS {
        let r = round_trip(backend, WriteOptions::default(), two_cursors(), write_pos);
        let a = r.archive.find_object("/A").unwrap().expect("Missing /A");
        let pos = a.properties().unwrap().array_property("pos").unwrap().expect("Missing pos");

        assert_eq!(pos.num_samples(), 3, "{:?}", backend);
        assert!(!pos.is_constant());
        assert_eq!(pos.header().meta_data.interpretation(), Some("point"));
        let s0 = pos.sample(0).unwrap();
        let s1 = pos.sample(1).unwrap();
        assert_eq!(s0.bytes(), s1.bytes());
        assert_eq!(s0.dims(), &Dimensions::d1(1));
        assert_eq!(pos.sample(2).unwrap().values::<f32>().unwrap(), vec![1.0; 3]);

        let (index, _) = pos.time_sampling().floor_index(0.05, pos.num_samples()).unwrap();
        assert_eq!(index, 1);
        assert_eq!(pos.sample(SampleSelector::TimeFloor(0.05)).unwrap(), s1);
        assert_eq!(pos.num_unique_payloads().unwrap(), 2);
        assert_eq!(r.archive.max_num_samples_for_time_sampling(1), Some(3));
    }
}

#[test]
fn test_two_cursors_read_concurrently() {
    for backend in BACKENDS {
        let r = round_trip(backend, WriteOptions::default(), two_cursors(), write_pos);
        let read = |cursor: usize| {
            let archive = r.archive.with_cursor(cursor).unwrap();
            let pos = archive
                .find_object("/A")
                .unwrap()
                .unwrap()
                .properties()
                .unwrap()
                .array_property("pos")
                .unwrap()
                .unwrap();
            assert_eq!(pos.cursor(), cursor);
            let samples: Vec<_> = (0..pos.num_samples()).map(|i| pos.sample(i).unwrap()).collect();
            (pos.header().clone(), samples)
        };

        let (first, second) = std::thread::scope(|s| {
            let a = s.spawn(|| read(0));
            let b = s.spawn(|| read(1));
            (a.join().unwrap(), b.join().unwrap())
        });
        assert_eq!(first, second);

        let pos = r.archive.find_object("/A").unwrap().unwrap().properties().unwrap();
        let parallel = pos.array_property("pos").unwrap().unwrap().read_samples_parallel(0..3).unwrap();
        assert_eq!(parallel, first.1);
    }
}

#[test]
fn test_out_of_order_leaves_count() {
    for backend in BACKENDS {
        let r = round_trip(backend, WriteOptions::default(), two_cursors(), |out| {
            let a = out.create_child(out.top(), "A", MetaData::new())?;
            let props = out.properties(a)?;
            let x = out.create_scalar_property(props, "x", MetaData::new(), DataType::INT32, 0)?;
            out.set_scalar_sample(x, 0, 0.0, &ScalarSample::from_value(1i32))?;

            let err = out.set_scalar_sample(x, 2, 0.0, &ScalarSample::from_value(3i32)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::OutOfOrder);
            assert_eq!(err.path(), Some("/A/x"));
            assert_eq!(out.num_samples(x)?, 1);
            out.set_scalar_sample(x, 1, 0.0, &ScalarSample::from_value(2i32))
        });
        let x = r.archive.find_object("/A").unwrap().unwrap().properties().unwrap();
        let x = x.scalar_property("x").unwrap().unwrap();
        assert_eq!(x.num_samples(), 2);
        assert_eq!(x.sample(1).unwrap().value::<i32>().unwrap(), 2);
    }
}

#[test]
fn test_duplicate_name_keeps_first() {
    for backend in BACKENDS {
        let r = round_trip(backend, WriteOptions::default(), two_cursors(), |out| {
            let md: MetaData = [("first", "yes")].into_iter().collect();
            let a = out.create_child(out.top(), "A", md)?;
            let err = out.create_child(out.top(), "A", MetaData::new()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DuplicateName);

            let props = out.properties(a)?;
            out.create_compound_property(props, "user", MetaData::new())?;
            let err = out
                .create_scalar_property(props, "user", MetaData::new(), DataType::FLOAT32, 0)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DuplicateName);
            Ok(())
        });
        let top = r.archive.top();
        assert_eq!(top.num_children().unwrap(), 1);
        let a = top.child_at(0).unwrap();
        assert_eq!(a.meta_data().get("first"), Some("yes"));
        let props = a.properties().unwrap();
        assert_eq!(props.num_properties().unwrap(), 1);
        assert!(props.compound_property("user").unwrap().is_some());
    }
}

#[test]
fn test_dedup_stores_one_block() {
    for backend in BACKENDS {
        let values: Vec<f64> = (0..64).map(f64::from).collect();
        let sample = ArraySample::from_values(&values, 1).expect("Failed to build sample");
        let r = round_trip(backend, WriteOptions::default(), two_cursors(), |out| {
            let a = out.create_child(out.top(), "A", MetaData::new())?;
            let b = out.create_child(out.top(), "B", MetaData::new())?;
            for obj in [a, b] {
                let props = out.properties(obj)?;
                let w = out.create_array_property(props, "w", MetaData::new(), DataType::FLOAT64, 0)?;
                out.set_array_sample(w, 0, 0.0, &sample)?;
            }
            Ok(())
        });
        assert_eq!(r.stats.sample_blocks, 1, "{:?}", backend);
        assert_eq!(r.stats.dedup.hits, 1);
        assert_eq!(r.stats.dedup.bytes_saved, 64 * 8);

        let read = |path: &str| {
            let props = r.archive.find_object(path).unwrap().unwrap().properties().unwrap();
            props.array_property("w").unwrap().unwrap()
        };
        let (a, b) = (read("/A"), read("/B"));
        assert_eq!(a.sample(0).unwrap(), sample);
        assert_eq!(b.sample(0).unwrap(), sample);
        assert_eq!(a.sample_key(0).unwrap(), b.sample_key(0).unwrap());
    }
}

#[test]
fn test_dedup_disabled_stores_copies() {
    let options = WriteOptions { dedup: false, ..Default::default() };
    let r = round_trip(Backend::Memory, options, two_cursors(), |out| {
        let props = out.properties(out.top())?;
        for name in ["a", "b"] {
            let p = out.create_array_property(props, name, MetaData::new(), DataType::INT32, 0)?;
            out.set_array_sample(p, 0, 0.0, &ArraySample::from_values(&[7i32; 4], 1)?)?;
        }
        Ok(())
    });
    assert_eq!(r.stats.sample_blocks, 2);
    assert_eq!(r.stats.dedup.hits, 0);
}

#[test]
fn test_read_policies() {
    for backend in BACKENDS {
        let quiet = ReadOptions { policy: ErrorPolicy::QuietDefault, ..two_cursors() };
        let r = round_trip(backend, WriteOptions::default(), quiet, write_pos);
        let a = r.archive.find_object("/A").unwrap().unwrap();
        assert_eq!(a.policy(), ErrorPolicy::QuietDefault);
        assert!(a.child("nope").unwrap().is_none());

        let props = a.properties().unwrap();
        assert!(props.property("nope").unwrap().is_none());
        let pos = props.array_property("pos").unwrap().unwrap();
        assert!(pos.get_sample(10).unwrap().is_none());

        let strict = a.with_policy(ErrorPolicy::Throw);
        let err = strict.child("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.path(), Some("/A"));
    }
}

#[test]
fn test_write_policy_on_object() {
    let r = round_trip(Backend::Memory, WriteOptions::default(), two_cursors(), |out| {
        let a = out.create_child(out.top(), "A", MetaData::new())?;
        out.set_object_policy(a, ErrorPolicy::NoisyDefault)?;
        let props = out.properties(a)?;
        let x = out.create_scalar_property(props, "x", MetaData::new(), DataType::FLOAT32, 0)?;
        // Swallowed by the object's policy.
        out.set_scalar_sample(x, 3, 0.0, &ScalarSample::from_value(1.0f32))?;
        out.set_scalar_sample(x, 0, 0.0, &ScalarSample::from_value(1.0f32))
    });
    let props = r.archive.find_object("/A").unwrap().unwrap().properties().unwrap();
    assert_eq!(props.scalar_property("x").unwrap().unwrap().num_samples(), 1);
}

#[test]
fn test_strings() {
    for backend in BACKENDS {
        let r = round_trip(backend, WriteOptions::default(), two_cursors(), |out| {
            let props = out.properties(out.top())?;
            let names = out.create_array_property(props, "names", MetaData::new(), DataType::STRING, 0)?;
            out.set_array_sample(names, 0, 0.0, &ArraySample::from_strings(&["left", "", "right"])?)?;
            let label = out.create_scalar_property(props, "label", MetaData::new(), DataType::WSTRING, 0)?;
            out.set_scalar_sample(label, 0, 0.0, &ScalarSample::from_wstring("ünïcode")?)
        });
        let props = r.archive.top().properties().unwrap();
        let names = props.array_property("names").unwrap().unwrap().sample(0).unwrap();
        assert_eq!(names.strings().unwrap(), vec!["left", "", "right"]);
        assert_eq!(names.dims(), &Dimensions::d1(3));
        let label = props.scalar_property("label").unwrap().unwrap().sample(0).unwrap();
        assert_eq!(label.strings().unwrap(), vec!["ünïcode"]);
    }
}

#[test]
fn test_compressed_round_trip() {
    let values: Vec<f32> = (0..3000).map(|i| (i % 7) as f32).collect();
    let sample = ArraySample::from_values(&values, 3).expect("Failed to build sample").with_dims((100, 10));
    let build = |out: &mut OArchive| -> Result<()> {
        let props = out.properties(out.top())?;
        let p = out.create_array_property(props, "grid", MetaData::new(), DataType::VEC3F, 0)?;
        out.set_array_sample(p, 0, 0.0, &sample)
    };

    let plain = round_trip(Backend::Ogawa, WriteOptions::default(), two_cursors(), build);
    let packed = round_trip(
        Backend::Ogawa,
        WriteOptions { compression: 6, ..Default::default() },
        two_cursors(),
        build,
    );
    assert!(packed.stats.bytes_written < plain.stats.bytes_written);

    for r in [&plain, &packed] {
        let grid = r.archive.top().properties().unwrap().array_property("grid").unwrap().unwrap();
        let read = grid.sample(0).unwrap();
        assert_eq!(read.dims(), &Dimensions::d2(100, 10));
        assert_eq!(read, sample);
    }
}

#[test]
fn test_closed_nodes_reject_writes() {
    round_trip(Backend::Memory, WriteOptions::default(), two_cursors(), |out| {
        let a = out.create_child(out.top(), "A", MetaData::new())?;
        let props = out.properties(a)?;
        let x = out.create_scalar_property(props, "x", MetaData::new(), DataType::UINT8, 0)?;
        out.set_scalar_sample(x, 0, 0.0, &ScalarSample::from_value(1u8))?;
        out.close_object(a)?;

        let err = out.create_child(a, "B", MetaData::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);
        let err = out.set_scalar_sample(x, 1, 0.0, &ScalarSample::from_value(2u8)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);
        // Siblings stay writable.
        out.create_child(out.top(), "C", MetaData::new())?;
        Ok(())
    });
}

#[test]
fn test_time_mismatch_only_for_fixed_sampling() {
    round_trip(Backend::Memory, WriteOptions::default(), two_cursors(), |out| {
        let uniform = out.add_time_sampling(TimeSampling::uniform(0.5, 0.0)?)?;
        let acyclic = out.add_time_sampling(TimeSampling::acyclic(vec![0.0, 3.0])?)?;
        let props = out.properties(out.top())?;
        let u = out.create_scalar_property(props, "u", MetaData::new(), DataType::INT8, uniform)?;
        let v = out.create_scalar_property(props, "v", MetaData::new(), DataType::INT8, acyclic)?;

        let err = out.set_scalar_sample(u, 0, 0.25, &ScalarSample::from_value(0i8)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimeMismatch);
        out.set_scalar_sample(u, 0, 0.0, &ScalarSample::from_value(0i8))?;
        out.set_scalar_sample(v, 0, 99.0, &ScalarSample::from_value(0i8))?;
        Ok(())
    });
}

#[test]
fn test_archive_metadata() {
    for backend in BACKENDS {
        let options = WriteOptions { application: Some("unit".into()), ..Default::default() };
        let r = round_trip(backend, options, two_cursors(), |out| {
            out.set_description("two cubes")?;
            out.set_date_written("Mon Oct 19 2026")?;
            Ok(())
        });
        let archive = &r.archive;
        assert_eq!(archive.application(), Some("unit"));
        assert_eq!(archive.description(), Some("two cubes"));
        assert_eq!(archive.date_written(), Some("Mon Oct 19 2026"));
        assert!(archive.writer_version().is_some());
        assert_eq!(archive.num_time_samplings(), 1);
        assert!(archive.time_sampling(0).unwrap().is_static());
    }
}

#[test]
fn test_hierarchy_index_matches_walk() {
    let build = |out: &mut OArchive| -> Result<()> {
        let top = out.top();
        for name in ["x", "y"] {
            let obj = out.create_child(top, name, MetaData::new())?;
            for sub in ["1", "2", "3"] {
                out.create_child(obj, sub, [("n", sub)].into_iter().collect())?;
            }
        }
        Ok(())
    };
    let indexed = round_trip(Backend::Ogawa, WriteOptions::default(), two_cursors(), build);
    let walked = round_trip(
        Backend::Ogawa,
        WriteOptions::default(),
        ReadOptions { use_hierarchy_index: false, ..two_cursors() },
        build,
    );
    assert!(indexed.archive.has_hierarchy_index());
    assert!(!walked.archive.has_hierarchy_index());

    for path in ["/", "/x", "/y"] {
        let a = indexed.archive.find_object(path).unwrap().unwrap().child_headers().unwrap();
        let b = walked.archive.find_object(path).unwrap().unwrap().child_headers().unwrap();
        assert_eq!(a, b, "{}", path);
    }
    let y2 = walked.archive.find_object("/y/2").unwrap().unwrap();
    assert_eq!(y2.meta_data().get("n"), Some("2"));
}
