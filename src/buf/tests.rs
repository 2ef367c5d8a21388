use crate::error::Result;
use crate::proto::Endianness;
use crate::{ObjectPath, Signature};

use super::{padding_to, AlignedBuf, BodyBuf, ReadBuf};

#[test]
fn padding() {
    assert_eq!(padding_to(0, 8), 0);
    assert_eq!(padding_to(1, 8), 7);
    assert_eq!(padding_to(12, 8), 4);
    assert_eq!(padding_to(3, 4), 1);
    assert_eq!(padding_to(5, 1), 0);
}

#[test]
fn write_and_read_aligned() -> Result<()> {
    for endianness in [Endianness::LITTLE, Endianness::BIG] {
        let mut buf = AlignedBuf::new(endianness);
        buf.store(1u8);
        buf.store(0x1234u16);
        buf.store(0xdeadbeefu32);
        buf.write("foo");
        buf.write(ObjectPath::new("/a/b")?);
        buf.write(Signature::new("a{sv}")?);
        buf.store(u64::MAX);

        let mut read = ReadBuf::new(buf.get(), endianness);
        assert_eq!(read.load::<u8>()?, 1);
        assert_eq!(read.load::<u16>()?, 0x1234);
        assert_eq!(read.load::<u32>()?, 0xdeadbeef);
        assert_eq!(read.read_str()?, "foo");
        assert_eq!(read.read_object_path()?, ObjectPath::new("/a/b")?);
        assert_eq!(read.read_signature()?, Signature::new("a{sv}")?);
        assert_eq!(read.load::<u64>()?, u64::MAX);
        assert!(read.is_empty());
    }

    Ok(())
}

#[test]
fn little_endian_layout() {
    let mut buf = AlignedBuf::new(Endianness::LITTLE);
    buf.store(1u8);
    buf.write("ab");

    assert_eq!(buf.get(), &[1, 0, 0, 0, 2, 0, 0, 0, b'a', b'b', 0]);
}

#[test]
fn reject_bad_strings() {
    let data = [2, 0, 0, 0, b'a', b'b', 1];
    let mut read = ReadBuf::new(&data, Endianness::LITTLE);
    assert!(read.read_str().is_err());

    let data = [2, 0, 0, 0, b'a', 0, 0];
    let mut read = ReadBuf::new(&data, Endianness::LITTLE);
    assert!(read.read_str().is_err());

    let data = [9, 0, 0, 0, b'a'];
    let mut read = ReadBuf::new(&data, Endianness::LITTLE);
    assert!(read.read_str().is_err());
}

#[test]
fn body_arrays() {
    let mut body = BodyBuf::with_endianness(Endianness::LITTLE);
    body.write_array(["x", "yz"]);

    assert_eq!(body.signature(), "as");
    assert_eq!(
        body.get(),
        &[15, 0, 0, 0, 1, 0, 0, 0, b'x', 0, 0, 0, 2, 0, 0, 0, b'y', b'z', 0]
    );

    let mut body = BodyBuf::with_endianness(Endianness::BIG);
    body.write_array::<_, str>([]);
    assert_eq!(body.get(), &[0, 0, 0, 0]);
}
