//! Basic usage example for tagwire.
//!
//! This example demonstrates:
//! - Declaring a schema with a read/write protocol
//! - Serializing primitives, containers, and a user type
//! - Deserializing them back with framing intact
//!
//! Run with: `cargo run --example basic_usage`

use std::io::Cursor;

use tagwire::{Deserializer, Error, Schema, Serializer, Value};

#[derive(Debug, PartialEq)]
struct Sensor {
    label: String,
    samples: Vec<f64>,
}

fn main() -> Result<(), Error> {
    // Declare the schema: one protocol per user type.
    let mut builder = Schema::builder();
    builder
        .define::<Sensor>("Sensor")
        .write(|ser, sensor| {
            ser.write_str(&sensor.label)?;
            ser.write(&sensor.samples)
        })
        .read(|de| {
            Ok(Sensor {
                label: de.read_str()?,
                samples: de.read_as::<Vec<f64>>()?.unwrap_or_default(),
            })
        });
    let schema = builder.build()?;

    println!("tagwire Basic Usage Example");
    println!("===========================\n");

    // Serialize a mix of values into one buffer.
    let mut bytes = Vec::new();
    {
        let mut ser = Serializer::new(&mut bytes, &schema);
        ser.write_int(2024)?;
        ser.write_str("hello, wire")?;
        ser.write_value(&Value::List(vec![
            Value::Int(1),
            Value::Null,
            Value::Str("mixed".to_owned()),
        ]))?;
        ser.write(&Sensor { label: "thermo-1".to_owned(), samples: vec![21.5, 21.7, 22.0] })?;
        ser.flush()?;
    }
    println!("Wrote {} bytes", bytes.len());

    // Read everything back in order.
    let mut cursor = Cursor::new(bytes);
    let mut de = Deserializer::new(&mut cursor, &schema);

    println!("int:    {}", de.read_int()?);
    println!("str:    {}", de.read_str()?);
    println!("list:   {:?}", de.read_value()?);
    let sensor = de.read_object::<Sensor>()?;
    println!("sensor: {sensor:?}");

    Ok(())
}
