use splat_codecs::{
    SplatCodec,
    io::{
        ply::{
            PlyCodec,
            PropertyBuffer,
        },
        writer::write_ply_to_vec,
    },
    math,
    random_splats_seeded,
};

use _harness::{
    assert_close,
    assert_column_lengths,
    assert_unit_rotations,
    ply_bytes,
};

mod _harness;


const SPLAT_PROPERTIES: [(&str, &str); 14] = [
    ("float", "x"),
    ("float", "y"),
    ("float", "z"),
    ("float", "f_dc_0"),
    ("float", "f_dc_1"),
    ("float", "f_dc_2"),
    ("float", "opacity"),
    ("float", "scale_0"),
    ("float", "scale_1"),
    ("float", "scale_2"),
    ("float", "rot_0"),
    ("float", "rot_1"),
    ("float", "rot_2"),
    ("float", "rot_3"),
];


#[test]
fn test_ply_splat_properties() {
    let rows = vec![
        vec![1.0, 2.0, 3.0, 0.1, 0.2, 0.3, 0.5, -1.0, -2.0, -3.0, 2.0, 0.0, 0.0, 0.0],
        vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    ];
    let columns = PlyCodec.decode_to_columns(&ply_bytes(&SPLAT_PROPERTIES, &rows)).unwrap();

    assert_eq!(columns.len(), 2);
    assert_column_lengths(&columns, 2);
    assert_unit_rotations(&columns);

    assert_eq!(columns.position[2][0], 3.0);
    assert_eq!(columns.color[1][0], 0.2);
    assert_eq!(columns.opacity, vec![0.5, -0.5]);
    assert_eq!(columns.scale[0][0], -1.0);

    let first: [f32; 4] = std::array::from_fn(|axis| columns.rotation[axis][0]);
    assert_eq!(first, [1.0, 0.0, 0.0, 0.0]);
    let degenerate: [f32; 4] = std::array::from_fn(|axis| columns.rotation[axis][1]);
    assert_eq!(degenerate, [0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_ply_missing_scale_uses_defaults() {
    let properties = [
        ("float", "x"),
        ("float", "y"),
        ("float", "z"),
        ("uchar", "red"),
        ("uchar", "green"),
        ("uchar", "blue"),
    ];
    let rows = vec![vec![1.0, 2.0, 3.0, 255.0, 0.0, 128.0]];
    let bytes = ply_bytes(&properties, &rows);

    let columns = PlyCodec.decode_to_columns(&bytes).unwrap();
    assert_eq!(columns.len(), 1);
    assert_column_lengths(&columns, 1);

    for axis in 0..3 {
        assert_close(columns.scale[axis][0], 0.01f32.ln(), 1e-6);
    }
    assert_close(columns.opacity[0], math::logit(1.0), 1e-4);
    assert!(columns.opacity[0] > 13.0);

    let rotation: [f32; 4] = std::array::from_fn(|axis| columns.rotation[axis][0]);
    assert_eq!(rotation, [0.0, 0.0, 0.0, 1.0]);

    assert_close(columns.color[0][0], 0.5 / math::SH_C0, 1e-5);
    assert_close(columns.color[1][0], -0.5 / math::SH_C0, 1e-5);

    // the rgb bytes survive a trip through the row layout
    let buffer = PlyCodec.decode_to_splat_buffer(&bytes).unwrap();
    let row = buffer.rows()[0];
    assert_eq!(row.color, [255, 0, 128, 255]);
    assert_eq!(row.rotation, [128, 128, 128, 255]);
    assert_close(row.scale[0], 0.01, 1e-6);
}

#[test]
fn test_ply_sh_rest_and_types() {
    let mut properties = vec![("double", "x"), ("short", "y"), ("int", "z")];
    let names: Vec<String> = (0..9).rev().map(|k| format!("f_rest_{k}")).collect();
    for name in &names {
        properties.push(("float", name.as_str()));
    }

    // declared in reverse order, values equal to their index
    let rows = vec![[vec![0.25, -7.0, 70000.0], (0..9).rev().map(f64::from).collect()].concat()];
    let columns = PlyCodec.decode_to_columns(&ply_bytes(&properties, &rows)).unwrap();

    assert_eq!(columns.position[0][0], 0.25);
    assert_eq!(columns.position[1][0], -7.0);
    assert_eq!(columns.position[2][0], 70000.0);

    assert_eq!(columns.sh_degree(), Some(1));
    for k in 0..9 {
        assert_eq!(columns.sh_rest[k][0], k as f32);
    }
}

#[test]
fn test_ply_rejects_sparse_sh_rest() {
    let properties = [("float", "x"), ("float", "y"), ("float", "z"), ("float", "f_rest_0"), ("float", "f_rest_2")];
    let bytes = ply_bytes(&properties, &[vec![0.0; 5]]);
    assert!(PlyCodec.decode_to_columns(&bytes).unwrap_err().is_format());
}

#[test]
fn test_ply_verbatim() {
    let properties = [("uchar", "label"), ("ushort", "id"), ("char", "offset"), ("double", "weight")];
    let mut bytes = ply_bytes(&properties, &[vec![7.0, 513.0, -3.0, 0.125], vec![255.0, 0.0, 127.0, -1.5]]);

    // splice a second element onto the header and body
    let header_end = bytes.windows(11).position(|w| w == b"end_header\n").unwrap();
    bytes.splice(header_end..header_end, b"element face 1\nproperty uint index\n".iter().copied());
    bytes.extend_from_slice(&42u32.to_le_bytes());

    let data = PlyCodec.decode_verbatim(&bytes).unwrap();
    assert_eq!(data.comments, vec!["fixture".to_string()]);
    assert_eq!(data.elements.len(), 2);

    let vertex = data.element("vertex").unwrap();
    assert_eq!(vertex.count, 2);
    assert_eq!(vertex.property("label"), Some(&PropertyBuffer::UChar(vec![7, 255])));
    assert_eq!(vertex.property("id"), Some(&PropertyBuffer::UShort(vec![513, 0])));
    assert_eq!(vertex.property("offset"), Some(&PropertyBuffer::Char(vec![-3, 127])));
    assert_eq!(vertex.property("weight").unwrap().to_f32_vec(), vec![0.125, -1.5]);

    let face = data.element("face").unwrap();
    assert_eq!(face.property("index").unwrap().get(0), Some(42.0));
    assert_eq!(face.property("index").unwrap().get(1), None);

    // no x/y/z, so the splat view refuses it
    assert!(PlyCodec.decode_to_columns(&bytes).unwrap_err().is_format());
}

#[test]
fn test_ply_header_errors() {
    let cases: [&[u8]; 7] = [
        b"plx\nformat binary_little_endian 1.0\nelement vertex 0\nend_header\n",
        b"ply\nformat binary_little_endian 1.0\nelement vertex\nend_header\n",
        b"ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty quad x\nend_header\n",
        b"ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty float\nend_header\n",
        b"ply\nformat binary_little_endian 1.0\nelement vertex 1\nbogus float x\nend_header\n",
        b"ply\nformat binary_little_endian 1.0\nproperty float x\nelement vertex 0\nend_header\n",
        b"ply\nformat binary_little_endian 1.0\nelement vertex 0\nproperty float x\n",
    ];

    for case in cases {
        let err = PlyCodec.decode_to_columns(case).unwrap_err();
        assert!(err.is_format(), "{}: {err}", String::from_utf8_lossy(case));
    }

    let big_endian = b"ply\nformat binary_big_endian 1.0\nelement vertex 0\nend_header\n";
    assert!(PlyCodec.decode_to_columns(big_endian).unwrap_err().is_unsupported_version());

    let truncated = ply_bytes(&SPLAT_PROPERTIES, &[vec![0.0; 14]]);
    let err = PlyCodec.decode_to_columns(&truncated[..truncated.len() - 2]).unwrap_err();
    assert!(err.is_format(), "{err}");
}

#[test]
fn test_ply_writer_interop() {
    let expected = random_splats_seeded(64, 7);
    let bytes = write_ply_to_vec(&expected).unwrap();

    let columns = PlyCodec.decode_to_columns(&bytes).unwrap();
    assert_eq!(columns.len(), expected.len());
    assert_eq!(columns.sh_rest_count(), expected.sh_rest_count());
    assert_unit_rotations(&columns);

    assert_eq!(columns.position, expected.position);
    assert_eq!(columns.scale, expected.scale);
    assert_eq!(columns.color, expected.color);
    assert_eq!(columns.opacity, expected.opacity);
    assert_eq!(columns.sh_rest, expected.sh_rest);
    for axis in 0..4 {
        for (actual, expected) in columns.rotation[axis].iter().zip(&expected.rotation[axis]) {
            assert_close(*actual, *expected, 1e-6);
        }
    }

    let data = PlyCodec.decode_verbatim(&bytes).unwrap();
    assert!(data.comments[0].starts_with("splat_codecs"));
}
