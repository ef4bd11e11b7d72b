//! Supertype packet integration tests.
//!
//! Covers the literal polymorphic scenarios: ancestor packets in
//! declaration order, fallback readers, static writers, and the
//! built-in-as-super record.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Cursor;

use tagwire::{Deserializer, Error, Schema, Serializer, Value};

fn obj_header(name: &str) -> Vec<u8> {
    let mut bytes = vec![0x1C];
    bytes.extend_from_slice(&(name.len() as i32).to_be_bytes());
    bytes.extend_from_slice(name.as_bytes());
    bytes
}

fn string_record(s: &str) -> Vec<u8> {
    let mut bytes = vec![0x11];
    bytes.extend_from_slice(&(s.len() as i32).to_be_bytes());
    bytes.extend_from_slice(s.as_bytes());
    bytes
}

// ---------------------------------------------------------------------------
// Three-level chain: Parent / Sub / SubSub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Parent;

#[derive(Debug, Clone, PartialEq)]
struct Sub {
    base: Parent,
}

#[derive(Debug, Clone, PartialEq)]
struct SubSub {
    base: Sub,
    notes: Vec<String>,
}

fn chain_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.define_open::<Parent>("Parent").write(|ser, _| ser.write_str("parent"));
    builder
        .define_open::<Sub>("Sub")
        .extends(|sub: &Sub| &sub.base)
        .write(|ser, _| ser.write_str("subclass"));
    builder
        .define::<SubSub>("SubSub")
        .extends(|sub: &SubSub| &sub.base)
        .write(|ser, _| ser.write_str("subclass of subclass"))
        .read(|de| {
            let mut parent = de.supertype::<Parent>()?;
            let parent_note = parent.read_str()?;
            let mut sub = de.superclass()?;
            let sub_note = sub.read_str()?;
            let own_note = de.read_str()?;
            Ok(SubSub {
                base: Sub { base: Parent },
                notes: vec![parent_note, sub_note, own_note],
            })
        });
    builder.build().expect("chain schema builds")
}

#[test]
fn subtype_emits_one_packet_per_ancestor_writer_in_order() {
    let schema = chain_schema();
    let value = SubSub { base: Sub { base: Parent }, notes: Vec::new() };

    let mut bytes = Vec::new();
    let mut ser = Serializer::new(&mut bytes, &schema);
    ser.write(&value).unwrap();

    let mut expected = obj_header("SubSub");
    expected.push(0x02);
    expected.extend(obj_header("Parent"));
    expected.push(0x00);
    expected.extend(string_record("parent"));
    expected.push(0x00);
    expected.extend(obj_header("Sub"));
    expected.push(0x00);
    expected.extend(string_record("subclass"));
    expected.push(0x00);
    expected.extend(string_record("subclass of subclass"));
    expected.push(0x00);
    assert_eq!(bytes, expected);
}

#[test]
fn subtype_reader_retrieves_each_packet() {
    let schema = chain_schema();
    let value = SubSub { base: Sub { base: Parent }, notes: Vec::new() };

    let mut bytes = Vec::new();
    let mut ser = Serializer::new(&mut bytes, &schema);
    ser.write(&value).unwrap();
    let written = bytes.len();

    let mut cursor = Cursor::new(bytes);
    let mut de = Deserializer::new(&mut cursor, &schema);
    let decoded = de.read_object::<SubSub>().unwrap().expect("non-null");
    assert_eq!(
        decoded.notes,
        vec!["parent".to_owned(), "subclass".to_owned(), "subclass of subclass".to_owned()]
    );
    assert_eq!(cursor.position() as usize, written, "framing law");
}

#[test]
fn packets_are_addressable_by_name() {
    let mut builder = Schema::builder();
    builder.define_open::<Parent>("Parent").write(|ser, _| ser.write_str("parent"));
    builder
        .define_open::<Sub>("Sub")
        .extends(|sub: &Sub| &sub.base)
        .write(|ser, _| ser.write_str("subclass"));
    builder
        .define::<SubSub>("SubSub")
        .extends(|sub: &SubSub| &sub.base)
        .write(|ser, _| ser.write_str("own"))
        .read(|de| {
            // By-name lookup rather than by-type.
            let first = de.supertype_named("Parent")?.read_str()?;
            let second = de.supertype_named("Sub")?.read_str()?;
            let own = de.read_str()?;
            Ok(SubSub { base: Sub { base: Parent }, notes: vec![first, second, own] })
        });
    let schema = builder.build().unwrap();

    let mut bytes = Vec::new();
    Serializer::new(&mut bytes, &schema)
        .write(&SubSub { base: Sub { base: Parent }, notes: Vec::new() })
        .unwrap();

    let mut cursor = Cursor::new(bytes);
    let decoded = Deserializer::new(&mut cursor, &schema)
        .read_object::<SubSub>()
        .unwrap()
        .expect("non-null");
    assert_eq!(decoded.notes, vec!["parent", "subclass", "own"]);
}

// ---------------------------------------------------------------------------
// Fallback reader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Person {
    name: String,
    birth_year: i32,
}

#[derive(Debug, Clone)]
struct UniquePerson {
    person: Person,
}

#[test]
fn fallback_reader_materializes_the_supertype() {
    let mut builder = Schema::builder();
    builder
        .define_abstract::<Person>("Person")
        .fallback(|_| Ok(Person { name: "Joe Schmoe".to_owned(), birth_year: 1969 }));
    builder
        .define::<UniquePerson>("UniquePerson")
        .extends(|unique: &UniquePerson| &unique.person)
        .write(|ser, unique| {
            ser.write_str(&unique.person.name)?;
            ser.write_int(unique.person.birth_year)
        });
    let schema = builder.build().unwrap();

    let charlie = UniquePerson { person: Person { name: "Charlie".to_owned(), birth_year: 17 } };
    let mut bytes = Vec::new();
    Serializer::new(&mut bytes, &schema).write(&charlie).unwrap();
    let written = bytes.len();

    let mut cursor = Cursor::new(bytes);
    let mut de = Deserializer::new(&mut cursor, &schema);
    let person = de.read_object::<Person>().unwrap().expect("non-null");
    assert_eq!(person, Person { name: "Joe Schmoe".to_owned(), birth_year: 1969 });
    // The fallback consumed nothing; the unread payload was discarded and
    // framing still holds.
    assert_eq!(cursor.position() as usize, written);
}

#[test]
fn missing_reader_is_a_missing_operation() {
    let mut builder = Schema::builder();
    builder.define::<Person>("Person").write(|ser, p| ser.write_str(&p.name));
    let schema = builder.build().unwrap();

    let mut bytes = Vec::new();
    Serializer::new(&mut bytes, &schema)
        .write(&Person { name: "x".to_owned(), birth_year: 0 })
        .unwrap();

    let mut cursor = Cursor::new(bytes);
    let err = Deserializer::new(&mut cursor, &schema)
        .read_value()
        .expect_err("no reader anywhere");
    assert!(matches!(err, Error::MissingOperation(_)));
}

// ---------------------------------------------------------------------------
// Static writers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Directory {
    region: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Phonebook {
    directory: Directory,
    entries: Vec<(String, String)>,
}

#[test]
fn static_write_suppresses_supertype_packets() {
    let mut builder = Schema::builder();
    builder.define_open::<Directory>("Directory").write(|ser, d| ser.write_str(&d.region));
    builder
        .define_open::<Phonebook>("Phonebook")
        .extends(|book: &Phonebook| &book.directory)
        .static_write(|ser, book| {
            ser.write_int(book.entries.len() as i32)?;
            for (name, number) in &book.entries {
                ser.write_str(name)?;
                ser.write_str(number)?;
            }
            Ok(())
        })
        .read(|de| {
            let count = de.read_int()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push((de.read_str()?, de.read_str()?));
            }
            Ok(Phonebook { directory: Directory { region: String::new() }, entries })
        });
    let schema = builder.build().unwrap();

    let book = Phonebook {
        directory: Directory { region: "north".to_owned() },
        entries: vec![("ada".to_owned(), "555-0100".to_owned())],
    };
    let mut bytes = Vec::new();
    Serializer::new(&mut bytes, &schema).write(&book).unwrap();

    // Header declares zero supertype packets and no Directory packet ever
    // appears.
    let header = obj_header("Phonebook");
    assert_eq!(&bytes[..header.len()], header.as_slice());
    assert_eq!(bytes[header.len()], 0x00);
    let needle = b"Directory";
    assert!(!bytes.windows(needle.len()).any(|w| w == needle));

    let mut cursor = Cursor::new(bytes);
    let decoded = Deserializer::new(&mut cursor, &schema)
        .read_object::<Phonebook>()
        .unwrap()
        .expect("non-null");
    assert_eq!(decoded.entries, book.entries);
}

// ---------------------------------------------------------------------------
// Built-in-as-super
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Inventory {
    label: String,
    counts: Vec<(String, i32)>,
}

#[test]
fn builtin_base_travels_as_the_trailing_packet() {
    let mut builder = Schema::builder();
    builder
        .define::<Inventory>("Inventory")
        .extends_builtin(|inv: &Inventory| {
            Value::Map(
                inv.counts
                    .iter()
                    .map(|(k, v)| (Value::Str(k.clone()), Value::Int(*v)))
                    .collect(),
            )
        })
        .write(|ser, inv| ser.write_str(&inv.label))
        .read(|de| {
            let entries = match de.builtin_super()? {
                Value::Map(entries) => entries,
                other => return Err(Error::type_mismatch("MAP", other.flag().name())),
            };
            let counts = entries
                .into_iter()
                .map(|(k, v)| match (k, v) {
                    (Value::Str(name), Value::Int(count)) => Ok((name, count)),
                    _ => Err(Error::framing("unexpected inventory entry shape")),
                })
                .collect::<tagwire::Result<Vec<_>>>()?;
            let label = de.read_str()?;
            Ok(Inventory { label, counts })
        });
    let schema = builder.build().unwrap();

    let inventory = Inventory {
        label: "warehouse".to_owned(),
        counts: vec![("bolts".to_owned(), 40), ("nuts".to_owned(), 0)],
    };
    let mut bytes = Vec::new();
    Serializer::new(&mut bytes, &schema).write(&inventory).unwrap();

    // One super packet: the bare MAP record.
    let header = obj_header("Inventory");
    assert_eq!(bytes[header.len()], 0x01);
    assert_eq!(bytes[header.len() + 1], 0x18);

    let mut cursor = Cursor::new(bytes);
    let decoded = Deserializer::new(&mut cursor, &schema)
        .read_object::<Inventory>()
        .unwrap()
        .expect("non-null");
    assert_eq!(decoded, inventory);
}

// ---------------------------------------------------------------------------
// Objects inside containers
// ---------------------------------------------------------------------------

#[test]
fn objects_nest_inside_containers() {
    let mut builder = Schema::builder();
    builder
        .define::<Person>("Person")
        .write(|ser, p| {
            ser.write_str(&p.name)?;
            ser.write_int(p.birth_year)
        })
        .read(|de| Ok(Person { name: de.read_str()?, birth_year: de.read_int()? }));
    let schema = builder.build().unwrap();

    let list = Value::List(vec![
        Value::object(Person { name: "Ada".to_owned(), birth_year: 1815 }),
        Value::Null,
    ]);
    let mut bytes = Vec::new();
    Serializer::new(&mut bytes, &schema).write_value(&list).unwrap();

    let mut cursor = Cursor::new(bytes);
    let decoded = Deserializer::new(&mut cursor, &schema).read_value().unwrap();
    let Value::List(items) = decoded else { panic!("expected a list") };
    assert_eq!(items.len(), 2);
    let person = items[0].as_object().expect("object element");
    assert_eq!(
        person.downcast_ref::<Person>(),
        Some(&Person { name: "Ada".to_owned(), birth_year: 1815 })
    );
    assert!(items[1].is_null());
}
