//! Black-box tests for the binary (`bplist00`) reader, driven through
//! the crate's public `read_plist` façade rather than the internal
//! `binary` module directly.

use nsplist::{read_plist, Error, Node, Number};

fn bplist(object_table: &[u8], offsets: &[u8], offset_size: u8, ref_size: u8, num_objects: u8, root: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"bplist00");
    buf.extend_from_slice(object_table);
    let offset_table_offset = buf.len() as u64;
    buf.extend_from_slice(offsets);
    buf.extend_from_slice(&[0u8; 5]);
    buf.push(0);
    buf.push(offset_size);
    buf.push(ref_size);
    buf.extend_from_slice(&(num_objects as u64).to_be_bytes());
    buf.extend_from_slice(&(root as u64).to_be_bytes());
    buf.extend_from_slice(&offset_table_offset.to_be_bytes());
    buf
}

#[test]
fn test_point_like_dictionary() {
    // { "x": 1, "y": 20 }
    let object_table = [
        0b1101_0010, 0x01, 0x02, 0x03, 0x04, // dict, 2 entries: keys [1,2] values [3,4]
        0b0101_0001, b'x',                   // object 1: "x"
        0b0101_0001, b'y',                   // object 2: "y"
        0b0001_0000, 0x01,                   // object 3: 1
        0b0001_0000, 0x14,                   // object 4: 20
    ];
    let offsets = [8u8, 13, 15, 17, 19];
    let data = bplist(&object_table, &offsets, 1, 1, 5, 0);

    let node = read_plist(&data).unwrap();
    let dict = node.as_dict().unwrap();
    assert_eq!(dict.get("x"), Some(&Node::Number(Number::Integer(1))));
    assert_eq!(dict.get("y"), Some(&Node::Number(Number::Integer(20))));
}

#[test]
fn test_integer_list_array() {
    let object_table = [
        0b1010_0101, 0x01, 0x02, 0x03, 0x04, 0x05, // array, 5 elements
        0b0001_0000, 0x01,
        0b0001_0000, 0x02,
        0b0001_0000, 0x03,
        0b0001_0000, 0x04,
        0b0001_0000, 0x05,
    ];
    let offsets = [8u8, 15, 17, 19, 21, 23];
    let data = bplist(&object_table, &offsets, 1, 1, 6, 0);

    let node = read_plist(&data).unwrap();
    let array = node.as_array().unwrap();
    let values: Vec<i64> = array.iter().map(|n| n.as_number_i64().unwrap()).collect();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_cycle_is_rejected_as_malformed() {
    // A single object: an array whose lone element refers back to itself.
    let object_table = [0b1010_0001, 0x00];
    let offsets = [8u8];
    let data = bplist(&object_table, &offsets, 1, 1, 1, 0);

    assert!(matches!(read_plist(&data), Err(Error::MalformedFormat(_))));
}

#[test]
fn test_s1_boolean_true() {
    let object_table = [0b0000_1001];
    let offsets = [8u8];
    let data = bplist(&object_table, &offsets, 1, 1, 1, 0);

    assert_eq!(read_plist(&data).unwrap(), Node::Boolean(true));
}
