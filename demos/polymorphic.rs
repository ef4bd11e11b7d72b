//! Polymorphic serialization example.
//!
//! This example demonstrates:
//! - An extensible type hierarchy declared through `extends`
//! - Supertype packets written one per ancestor writer
//! - A subtype reader pulling each packet by type
//! - A fallback reader standing in for a reader-less subtype
//!
//! Run with: `cargo run --example polymorphic`

use std::io::Cursor;

use tagwire::{Deserializer, Error, Schema, Serializer};

#[derive(Debug, Clone, PartialEq)]
struct Shape {
    id: i32,
}

#[derive(Debug, Clone, PartialEq)]
struct Circle {
    shape: Shape,
    radius: f64,
}

fn main() -> Result<(), Error> {
    let mut builder = Schema::builder();
    builder
        .define_open::<Shape>("Shape")
        .write(|ser, shape| ser.write_int(shape.id))
        .fallback(|_| Ok(Shape { id: -1 }));
    builder
        .define::<Circle>("Circle")
        .extends(|circle: &Circle| &circle.shape)
        .write(|ser, circle| ser.write_double(circle.radius))
        .read(|de| {
            let id = de.supertype::<Shape>()?.read_int()?;
            Ok(Circle { shape: Shape { id }, radius: de.read_double()? })
        });
    let schema = builder.build()?;

    let circle = Circle { shape: Shape { id: 7 }, radius: 2.5 };

    let mut bytes = Vec::new();
    Serializer::new(&mut bytes, &schema).write(&circle)?;
    println!("Circle wire image: {} bytes", bytes.len());

    // The subtype reader reassembles the circle from its own payload plus
    // the Shape packet.
    let mut cursor = Cursor::new(bytes);
    let decoded = Deserializer::new(&mut cursor, &schema).read_object::<Circle>()?;
    println!("decoded: {decoded:?}");
    assert_eq!(decoded.as_ref(), Some(&circle));

    Ok(())
}
