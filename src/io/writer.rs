use std::io::Write;

use ply_rs::{
    ply::{
        Addable,
        DefaultElement,
        ElementDef,
        Encoding,
        Ply,
        Property,
        PropertyDef,
        PropertyType,
        ScalarType,
    },
    writer::Writer,
};

use crate::gaussian::{
    ColumnTable,
    SplatBuffer,
};


/// Encodes a column table as a binary little-endian ply with one float
/// property per column.
pub fn write_ply<W: Write>(
    columns: &ColumnTable,
    out: &mut W,
) -> Result<usize, std::io::Error> {
    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::BinaryLittleEndian;
    ply.header.comments.push(format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")));

    let sources = columns.columns().collect::<Vec<_>>();

    let mut vertex = ElementDef::new("vertex".to_string());
    for (name, _) in &sources {
        vertex.properties.add(PropertyDef::new(
            name.clone(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
    ply.header.elements.add(vertex);

    let mut vertices = Vec::with_capacity(columns.len());
    for row in 0..columns.len() {
        let mut element = DefaultElement::new();
        for (name, column) in &sources {
            element.insert(name.clone(), Property::Float(column[row]));
        }
        vertices.push(element);
    }
    ply.payload.insert("vertex".to_string(), vertices);

    Writer::new().write_ply(out, &mut ply)
}

pub fn write_ply_to_vec(columns: &ColumnTable) -> Result<Vec<u8>, std::io::Error> {
    let mut out = Vec::new();
    write_ply(columns, &mut out)?;
    Ok(out)
}

pub fn write_splat<W: Write>(
    buffer: &SplatBuffer,
    out: &mut W,
) -> Result<usize, std::io::Error> {
    let bytes = buffer.to_bytes();
    out.write_all(&bytes)?;
    Ok(bytes.len())
}
