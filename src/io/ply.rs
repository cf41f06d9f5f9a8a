use std::collections::HashMap;

use tracing::debug;

use crate::{
    error::DecodeError,
    gaussian::{
        ColumnTable,
        SplatBuffer,
        columns::parse_sh_rest_index,
    },
    io::codec::{
        SplatCodec,
        SplatFormat,
    },
    math::{
        self,
        quaternion,
    },
};


pub const PLY_MAGIC: &[u8] = b"ply\n";
pub const HEADER_TERMINATOR: &[u8] = b"\nend_header\n";

const SUPPORTED_FORMAT: &str = "binary_little_endian";
const DEFAULT_LINEAR_SCALE: f32 = 0.01;


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl ScalarType {
    pub fn parse(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "char" | "int8" => ScalarType::Char,
            "uchar" | "uint8" => ScalarType::UChar,
            "short" | "int16" => ScalarType::Short,
            "ushort" | "uint16" => ScalarType::UShort,
            "int" | "int32" => ScalarType::Int,
            "uint" | "uint32" => ScalarType::UInt,
            "float" | "float32" => ScalarType::Float,
            "double" | "float64" => ScalarType::Double,
            _ => return None,
        })
    }

    pub fn size(&self) -> usize {
        match self {
            ScalarType::Char | ScalarType::UChar => 1,
            ScalarType::Short | ScalarType::UShort => 2,
            ScalarType::Int | ScalarType::UInt | ScalarType::Float => 4,
            ScalarType::Double => 8,
        }
    }

    /// Reads one little-endian value; `bytes` must hold at least `size()` bytes.
    fn read(&self, bytes: &[u8]) -> f64 {
        match self {
            ScalarType::Char => bytes[0] as i8 as f64,
            ScalarType::UChar => bytes[0] as f64,
            ScalarType::Short => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            ScalarType::UShort => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            ScalarType::Int => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            ScalarType::UInt => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            ScalarType::Float => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            ScalarType::Double => f64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
                bytes[4], bytes[5], bytes[6], bytes[7],
            ]),
        }
    }
}


#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: String,
    pub scalar_type: ScalarType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementDef {
    pub name: String,
    pub count: usize,
    pub properties: Vec<PropertyDef>,
}

impl ElementDef {
    pub fn stride(&self) -> usize {
        self.properties
            .iter()
            .map(|property| property.scalar_type.size())
            .sum()
    }

    fn body_size(&self) -> Result<usize, DecodeError> {
        self.count
            .checked_mul(self.stride())
            .ok_or_else(|| DecodeError::format(format!("ply element `{}` is too large", self.name)))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlyHeader {
    pub format: Option<String>,
    pub comments: Vec<String>,
    pub obj_info: Vec<String>,
    pub elements: Vec<ElementDef>,
    /// Byte offset of the body, just past the terminator.
    pub header_size: usize,
}

impl PlyHeader {
    pub fn element(&self, name: &str) -> Option<&ElementDef> {
        self.elements.iter().find(|element| element.name == name)
    }

    /// Locates the body bytes of every element, checking that the buffer
    /// holds all of them.
    fn element_bodies<'a>(&self, data: &'a [u8]) -> Result<Vec<&'a [u8]>, DecodeError> {
        let mut offset = self.header_size;
        let mut bodies = Vec::with_capacity(self.elements.len());

        for element in &self.elements {
            let size = element.body_size()?;
            let end = offset
                .checked_add(size)
                .ok_or_else(|| DecodeError::format("ply body size overflows"))?;
            if end > data.len() {
                return Err(DecodeError::truncated("ply", end, data.len()));
            }

            bodies.push(&data[offset..end]);
            offset = end;
        }

        Ok(bodies)
    }
}


pub fn parse_header(data: &[u8]) -> Result<PlyHeader, DecodeError> {
    if !data.starts_with(PLY_MAGIC) {
        return Err(DecodeError::format("invalid ply magic"));
    }

    let terminator = data
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
        .ok_or_else(|| DecodeError::format("ply header terminator not found"))?;
    let header_size = terminator + HEADER_TERMINATOR.len();

    let text = String::from_utf8_lossy(&data[..header_size]);
    let mut header = PlyHeader {
        header_size,
        ..Default::default()
    };

    let lines = text
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .skip(1);

    for line in lines {
        let words = line.split_whitespace().collect::<Vec<_>>();
        let Some(&keyword) = words.first() else {
            continue;
        };

        match keyword {
            "ply" | "end_header" => {}
            "format" => {
                let format = words.get(1).copied().unwrap_or_default();
                if format != SUPPORTED_FORMAT {
                    return Err(DecodeError::UnsupportedVersion {
                        container: "ply",
                        version: words[1..].join(" "),
                    });
                }
                header.format = Some(words[1..].join(" "));
            }
            "comment" => header.comments.push(rest_of_line(line, keyword)),
            "obj_info" => header.obj_info.push(rest_of_line(line, keyword)),
            "element" => {
                if words.len() != 3 {
                    return Err(DecodeError::format(format!("invalid ply header line: {line}")));
                }
                let count = words[2]
                    .parse::<usize>()
                    .map_err(|_| DecodeError::format(format!("invalid ply element count: {line}")))?;

                header.elements.push(ElementDef {
                    name: words[1].to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            "property" => {
                let Some(element) = header.elements.last_mut() else {
                    return Err(DecodeError::format("ply property outside of an element"));
                };
                if words.len() != 3 {
                    return Err(DecodeError::format(format!("invalid ply header line: {line}")));
                }
                let scalar_type = ScalarType::parse(words[1])
                    .ok_or_else(|| DecodeError::format(format!("unrecognized ply property type: {}", words[1])))?;

                element.properties.push(PropertyDef {
                    name: words[2].to_string(),
                    scalar_type,
                });
            }
            _ => {
                return Err(DecodeError::format(format!("unrecognized ply header value: {keyword}")));
            }
        }
    }

    debug!(
        "ply header: {} elements, {} comments, body at {}",
        header.elements.len(),
        header.comments.len(),
        header.header_size,
    );

    Ok(header)
}

fn rest_of_line(line: &str, keyword: &str) -> String {
    line.trim_start()[keyword.len()..].trim().to_string()
}


/// One property column with the type it was declared with.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyBuffer {
    Char(Vec<i8>),
    UChar(Vec<u8>),
    Short(Vec<i16>),
    UShort(Vec<u16>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl PropertyBuffer {
    fn with_capacity(scalar_type: ScalarType, capacity: usize) -> Self {
        match scalar_type {
            ScalarType::Char => PropertyBuffer::Char(Vec::with_capacity(capacity)),
            ScalarType::UChar => PropertyBuffer::UChar(Vec::with_capacity(capacity)),
            ScalarType::Short => PropertyBuffer::Short(Vec::with_capacity(capacity)),
            ScalarType::UShort => PropertyBuffer::UShort(Vec::with_capacity(capacity)),
            ScalarType::Int => PropertyBuffer::Int(Vec::with_capacity(capacity)),
            ScalarType::UInt => PropertyBuffer::UInt(Vec::with_capacity(capacity)),
            ScalarType::Float => PropertyBuffer::Float(Vec::with_capacity(capacity)),
            ScalarType::Double => PropertyBuffer::Double(Vec::with_capacity(capacity)),
        }
    }

    fn push_le(&mut self, bytes: &[u8]) {
        match self {
            PropertyBuffer::Char(values) => values.push(bytes[0] as i8),
            PropertyBuffer::UChar(values) => values.push(bytes[0]),
            PropertyBuffer::Short(values) => values.push(i16::from_le_bytes([bytes[0], bytes[1]])),
            PropertyBuffer::UShort(values) => values.push(u16::from_le_bytes([bytes[0], bytes[1]])),
            PropertyBuffer::Int(values) => values.push(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            PropertyBuffer::UInt(values) => values.push(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            PropertyBuffer::Float(values) => values.push(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            PropertyBuffer::Double(values) => values.push(ScalarType::Double.read(bytes)),
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            PropertyBuffer::Char(_) => ScalarType::Char,
            PropertyBuffer::UChar(_) => ScalarType::UChar,
            PropertyBuffer::Short(_) => ScalarType::Short,
            PropertyBuffer::UShort(_) => ScalarType::UShort,
            PropertyBuffer::Int(_) => ScalarType::Int,
            PropertyBuffer::UInt(_) => ScalarType::UInt,
            PropertyBuffer::Float(_) => ScalarType::Float,
            PropertyBuffer::Double(_) => ScalarType::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PropertyBuffer::Char(values) => values.len(),
            PropertyBuffer::UChar(values) => values.len(),
            PropertyBuffer::Short(values) => values.len(),
            PropertyBuffer::UShort(values) => values.len(),
            PropertyBuffer::Int(values) => values.len(),
            PropertyBuffer::UInt(values) => values.len(),
            PropertyBuffer::Float(values) => values.len(),
            PropertyBuffer::Double(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        Some(match self {
            PropertyBuffer::Char(values) => *values.get(index)? as f64,
            PropertyBuffer::UChar(values) => *values.get(index)? as f64,
            PropertyBuffer::Short(values) => *values.get(index)? as f64,
            PropertyBuffer::UShort(values) => *values.get(index)? as f64,
            PropertyBuffer::Int(values) => *values.get(index)? as f64,
            PropertyBuffer::UInt(values) => *values.get(index)? as f64,
            PropertyBuffer::Float(values) => *values.get(index)? as f64,
            PropertyBuffer::Double(values) => *values.get(index)?,
        })
    }

    pub fn to_f32_vec(&self) -> Vec<f32> {
        (0..self.len())
            .filter_map(|index| self.get(index))
            .map(|value| value as f32)
            .collect()
    }
}


#[derive(Clone, Debug, PartialEq)]
pub struct PlyProperty {
    pub name: String,
    pub values: PropertyBuffer,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlyElement {
    pub name: String,
    pub count: usize,
    pub properties: Vec<PlyProperty>,
}

impl PlyElement {
    pub fn property(&self, name: &str) -> Option<&PropertyBuffer> {
        self.properties
            .iter()
            .find(|property| property.name == name)
            .map(|property| &property.values)
    }
}

/// Every element of a ply file, one typed buffer per declared property.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlyData {
    pub comments: Vec<String>,
    pub elements: Vec<PlyElement>,
}

impl PlyData {
    pub fn element(&self, name: &str) -> Option<&PlyElement> {
        self.elements.iter().find(|element| element.name == name)
    }
}


/// Column offsets of the properties the splat decode reads from a vertex row.
struct VertexLayout<'a> {
    body: &'a [u8],
    stride: usize,
    offsets: HashMap<&'a str, (usize, ScalarType)>,
}

impl<'a> VertexLayout<'a> {
    fn new(element: &'a ElementDef, body: &'a [u8]) -> Self {
        let mut offsets = HashMap::with_capacity(element.properties.len());
        let mut offset = 0;
        for property in &element.properties {
            offsets.insert(property.name.as_str(), (offset, property.scalar_type));
            offset += property.scalar_type.size();
        }

        Self {
            body,
            stride: offset,
            offsets,
        }
    }

    fn find(&self, name: &str) -> Option<(usize, ScalarType)> {
        self.offsets.get(name).copied()
    }

    fn find_all<const N: usize>(&self, names: [&str; N]) -> Option<[(usize, ScalarType); N]> {
        let mut found = [(0, ScalarType::Float); N];
        for (slot, name) in found.iter_mut().zip(names) {
            *slot = self.find(name)?;
        }
        Some(found)
    }

    fn read(&self, row: usize, (offset, scalar_type): (usize, ScalarType)) -> f32 {
        scalar_type.read(&self.body[row * self.stride + offset..]) as f32
    }
}


#[derive(Clone, Copy, Debug, Default)]
pub struct PlyCodec;

impl PlyCodec {
    /// Decodes every element without any splat-specific transform.
    pub fn decode_verbatim(&self, data: &[u8]) -> Result<PlyData, DecodeError> {
        let header = parse_header(data)?;
        let bodies = header.element_bodies(data)?;

        let elements = header
            .elements
            .iter()
            .zip(bodies)
            .map(|(element, body)| read_element(element, body))
            .collect();

        Ok(PlyData {
            comments: header.comments,
            elements,
        })
    }

    fn decode_vertices(&self, data: &[u8]) -> Result<ColumnTable, DecodeError> {
        let header = parse_header(data)?;
        let bodies = header.element_bodies(data)?;

        let (vertex, body) = header
            .elements
            .iter()
            .zip(bodies)
            .find(|(element, _)| element.name == "vertex")
            .ok_or_else(|| DecodeError::format("ply file has no vertex element"))?;

        let layout = VertexLayout::new(vertex, body);
        let count = vertex.count;

        let position = layout
            .find_all(["x", "y", "z"])
            .ok_or_else(|| DecodeError::format("ply vertex element is missing x, y or z"))?;
        let scale = layout.find_all(["scale_0", "scale_1", "scale_2"]);
        let rotation = layout.find_all(["rot_0", "rot_1", "rot_2", "rot_3"]);
        let opacity = layout.find("opacity");
        let dc = layout.find_all(["f_dc_0", "f_dc_1", "f_dc_2"]);
        let rgb = layout.find_all(["red", "green", "blue"]);
        let sh_rest = sh_rest_layout(vertex, &layout)?;

        if scale.is_none() {
            debug!("ply vertex element has no scale, using {DEFAULT_LINEAR_SCALE}");
        }

        let default_scale = math::log_scale(DEFAULT_LINEAR_SCALE);
        let full_opacity = math::logit(1.0);
        let mut columns = ColumnTable::with_sh_rest(count, sh_rest.len());

        for row in 0..count {
            for axis in 0..3 {
                columns.position[axis][row] = layout.read(row, position[axis]);
                columns.scale[axis][row] = match scale {
                    Some(scale) => layout.read(row, scale[axis]),
                    None => default_scale,
                };
                columns.color[axis][row] = match (dc, rgb) {
                    (Some(dc), _) => layout.read(row, dc[axis]),
                    (None, Some(rgb)) => dc_from_color_value(layout.read(row, rgb[axis])),
                    (None, None) => 0.0,
                };
            }

            let q = match rotation {
                Some(rotation) => quaternion::normalize(rotation.map(|slot| layout.read(row, slot))),
                None => quaternion::IDENTITY,
            };
            for (axis, value) in q.into_iter().enumerate() {
                columns.rotation[axis][row] = value;
            }

            columns.opacity[row] = match opacity {
                Some(opacity) => layout.read(row, opacity),
                None => full_opacity,
            };

            for (column, slot) in columns.sh_rest.iter_mut().zip(&sh_rest) {
                column[row] = layout.read(row, *slot);
            }
        }

        Ok(columns)
    }
}

impl SplatCodec for PlyCodec {
    fn format(&self) -> SplatFormat {
        SplatFormat::Ply
    }

    fn decode_to_columns(&self, data: &[u8]) -> Result<ColumnTable, DecodeError> {
        self.decode_vertices(data)
    }

    fn decode_to_splat_buffer(&self, data: &[u8]) -> Result<SplatBuffer, DecodeError> {
        Ok(self.decode_vertices(data)?.to_splat_buffer())
    }
}


fn read_element(element: &ElementDef, body: &[u8]) -> PlyElement {
    let stride = element.stride();
    let mut properties = element
        .properties
        .iter()
        .map(|property| PlyProperty {
            name: property.name.clone(),
            values: PropertyBuffer::with_capacity(property.scalar_type, element.count),
        })
        .collect::<Vec<_>>();

    if stride > 0 {
        for row in body.chunks_exact(stride) {
            let mut offset = 0;
            for property in properties.iter_mut() {
                property.values.push_le(&row[offset..]);
                offset += property.values.scalar_type().size();
            }
        }
    }

    PlyElement {
        name: element.name.clone(),
        count: element.count,
        properties,
    }
}

/// `f_rest_*` offsets in index order; the indices must form `0..n`.
fn sh_rest_layout(
    element: &ElementDef,
    layout: &VertexLayout,
) -> Result<Vec<(usize, ScalarType)>, DecodeError> {
    let mut indices = element
        .properties
        .iter()
        .filter_map(|property| Some((parse_sh_rest_index(&property.name)?, property.name.as_str())))
        .collect::<Vec<_>>();
    indices.sort_unstable_by_key(|(index, _)| *index);

    indices
        .iter()
        .enumerate()
        .map(|(expected, (index, name))| {
            if *index != expected {
                return Err(DecodeError::format(format!(
                    "ply sh coefficients are not dense: expected f_rest_{expected}, found {name}",
                )));
            }
            layout
                .find(name)
                .ok_or_else(|| DecodeError::format(format!("ply property {name} vanished")))
        })
        .collect()
}

fn dc_from_color_value(value: f32) -> f32 {
    (value.clamp(0.0, 255.0) / 255.0 - 0.5) / math::SH_C0
}
