use super::*;
use errors::AnyResult;

#[test]
fn test_put_u32() {
    let encode = |value| {
        let mut buf = Vec::new();
        put_u32(&mut buf, value);
        buf
    };

    assert_eq!(vec![0, 0, 0, 0], encode(0));
    assert_eq!(vec![0, 0, 0, 1], encode(1));
    assert_eq!(vec![0, 0, 0, 255], encode(255));

    assert_eq!(vec![0, 0, 1, 0], encode(256));
    assert_eq!(vec![0, 0, 255, 255], encode(65535));
    assert_eq!(vec![0, 1, 0, 0], encode(65536));

    assert_eq!(vec![255, 255, 255, 255], encode(4294967295));
}

#[test]
fn test_read_integers() -> AnyResult<()> {
    let raw = [0, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 42, 7];
    let mut reader = ByteReader::new(&raw);

    assert_eq!(1, reader.u16()?);
    assert_eq!(65536, reader.u32()?);
    assert_eq!(42, reader.u64()?);
    assert_eq!(7, reader.u8()?);
    assert_eq!(0, reader.remaining());
    assert_eq!(raw.len(), reader.position());

    Ok(())
}

#[test]
fn test_read_past_the_end() {
    let mut reader = ByteReader::new(&[0, 0, 1]);

    assert_eq!(Err(CodecError::Incomplete { missing: 1 }), reader.u32());
    // Failing read doesn't consume anything.
    assert_eq!(0, reader.position());
    assert_eq!(Ok(0), reader.u16());
}

#[test]
fn test_convert_string() -> AnyResult<()> {
    let mut buf = Vec::new();
    put_string(&mut buf, "");
    assert_eq!(vec![0, 0, 0, 0], buf);

    let mut buf = Vec::new();
    put_string(&mut buf, "Hello world");
    assert_eq!(
        vec![0, 0, 0, 11, 72, 101, 108, 108, 111, 32, 119, 111, 114, 108, 100],
        buf
    );
    assert_eq!("Hello world", ByteReader::new(&buf).string()?);

    Ok(())
}

#[test]
fn test_read_truncated_string() {
    assert!(ByteReader::new(&[]).string().unwrap_err().is_incomplete());
    assert!(ByteReader::new(&[0, 0]).string().unwrap_err().is_incomplete());

    let mut reader = ByteReader::new(&[0, 0, 0, 3, 97]);
    assert_eq!(Err(CodecError::Incomplete { missing: 2 }), reader.string());
    assert_eq!(0, reader.position());
}

#[test]
fn test_read_invalid_string() {
    let mut reader = ByteReader::new(&[0, 0, 0, 2, 0xc3, 0x28]);
    assert_eq!(Err(CodecError::InvalidString), reader.string());
}

#[test]
fn test_reject_forged_length() {
    let mut reader = ByteReader::new(&[255, 255, 255, 255]);
    let err = reader.bytes().unwrap_err();
    assert!(matches!(err, CodecError::TooLarge { .. }));
    assert!(!err.is_incomplete());
}

#[test]
fn test_convert_u32_list() -> AnyResult<()> {
    let mut buf = Vec::new();
    put_u32_list(&mut buf, &[1, 2, 3, 4]);
    assert_eq!(
        vec![0, 0, 0, 4, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4],
        buf
    );
    assert_eq!(vec![1, 2, 3, 4], ByteReader::new(&buf).u32_list()?);

    let mut buf = Vec::new();
    put_u32_list(&mut buf, &[]);
    assert_eq!(Vec::<u32>::new(), ByteReader::new(&buf).u32_list()?);

    Ok(())
}

#[test]
fn test_read_array_list() -> AnyResult<()> {
    let raw = [0, 0, 0, 2, 1, 2, 3, 4];
    assert_eq!(vec![[1, 2], [3, 4]], ByteReader::new(&raw).array_list::<2>()?);

    let truncated = [0, 0, 0, 2, 1, 2, 3];
    assert!(ByteReader::new(&truncated)
        .array_list::<2>()
        .unwrap_err()
        .is_incomplete());

    Ok(())
}
