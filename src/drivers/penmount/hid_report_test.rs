use std::error::Error;

use packed_struct::PackedStruct;

use crate::drivers::penmount::{
    hid_report::{decode_p3, p2_checksum, PackedP2Report, TouchSample, P3_PACKET_SIZE},
    Error as DriverError,
};

// Touch on contact 0 at (16, 32)
// 70 10 00 20 00 5f
#[tokio::test]
async fn test_p2_report() -> Result<(), Box<dyn Error>> {
    let buf = [0x70, 0x10, 0x00, 0x20, 0x00, 0x5f];
    let report = PackedP2Report::decode(&buf)?;

    assert_eq!(report.touch_id(), 0);
    assert!(report.is_touching());
    assert_eq!(
        report.sample(),
        TouchSample {
            slot: 0,
            touch: true,
            x: 16,
            y: 32,
        }
    );

    let packed = PackedP2Report::new(0, true, 16, 32).pack()?;
    assert_eq!(packed, buf);

    Ok(())
}

// Release of contact 1 at (2047, 1024)
#[tokio::test]
async fn test_p2_release() -> Result<(), Box<dyn Error>> {
    let mut buf = [0x41, 0xFF, 0x07, 0x00, 0x04, 0x00];
    buf[5] = p2_checksum(&buf[..5]);
    let sample = PackedP2Report::decode(&buf)?.sample();

    assert_eq!(
        sample,
        TouchSample {
            slot: 1,
            touch: false,
            x: 0x7FF,
            y: 0x400,
        }
    );

    Ok(())
}

#[tokio::test]
async fn test_p2_checksum_corruption() -> Result<(), Box<dyn Error>> {
    let buf = PackedP2Report::new(1, true, 300, 1200).pack()?;
    assert!(PackedP2Report::decode(&buf).is_ok());

    // Any single corrupted byte must be caught
    for index in 0..buf.len() {
        let mut corrupted = buf;
        corrupted[index] ^= 0x01;
        let result = PackedP2Report::decode(&corrupted);
        assert!(
            matches!(result, Err(DriverError::Checksum { .. })),
            "byte {index} corruption was not detected"
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_p2_invalid_status() -> Result<(), Box<dyn Error>> {
    let mut buf = [0x20, 0x10, 0x00, 0x20, 0x00, 0x00];
    buf[5] = p2_checksum(&buf[..5]);
    let result = PackedP2Report::decode(&buf);
    assert!(matches!(result, Err(DriverError::InvalidStatus(0x20))));

    Ok(())
}

fn p3_frame(records: &[[u8; 6]]) -> [u8; P3_PACKET_SIZE] {
    let mut frame = [0u8; P3_PACKET_SIZE];
    let byte_count = 3 + records.len() * 6 + 1;
    frame[0] = byte_count as u8;
    frame[2] = 0x10;
    for (i, record) in records.iter().enumerate() {
        let offset = 3 + i * 6;
        frame[offset..offset + 6].copy_from_slice(record);
    }
    frame[byte_count - 1] = records.len() as u8;
    frame
}

// 0a 00 10 03 00 d2 04 2e 06 01
#[tokio::test]
async fn test_p3_report() -> Result<(), Box<dyn Error>> {
    let frame = p3_frame(&[[0x03, 0x00, 0xd2, 0x04, 0x2e, 0x06]]);
    assert_eq!(
        frame[..10],
        [0x0a, 0x00, 0x10, 0x03, 0x00, 0xd2, 0x04, 0x2e, 0x06, 0x01]
    );

    let samples = decode_p3(&frame)?;
    assert_eq!(
        samples,
        vec![TouchSample {
            slot: 0,
            touch: true,
            x: 0x4d2,
            y: 0x62e,
        }]
    );

    Ok(())
}

#[tokio::test]
async fn test_p3_multiple_records() -> Result<(), Box<dyn Error>> {
    let frame = p3_frame(&[
        [0x03, 0x02, 0x10, 0x00, 0x20, 0x00],
        [0x00, 0x05, 0x30, 0x00, 0x40, 0x00],
    ]);

    let samples = decode_p3(&frame)?;
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].slot, 2);
    assert!(samples[0].touch);
    assert_eq!(samples[1].slot, 5);
    assert!(!samples[1].touch);
    assert_eq!((samples[1].x, samples[1].y), (0x30, 0x40));

    Ok(())
}

#[tokio::test]
async fn test_p3_no_touch() -> Result<(), Box<dyn Error>> {
    // Payload is ignored, even with an invalid report id
    let mut frame = [0xFFu8; P3_PACKET_SIZE];
    frame[0] = 0x03;
    frame[1] = 0x00;

    let samples = decode_p3(&frame)?;
    assert!(samples.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_p3_invalid_frames() -> Result<(), Box<dyn Error>> {
    let mut frame = p3_frame(&[[0x03, 0x00, 0x10, 0x00, 0x20, 0x00]]);
    frame[2] = 0x11;
    assert!(matches!(
        decode_p3(&frame),
        Err(DriverError::InvalidReportId(0x11))
    ));

    let mut frame = p3_frame(&[[0x03, 0x00, 0x10, 0x00, 0x20, 0x00]]);
    frame[0] = 65;
    assert!(matches!(
        decode_p3(&frame),
        Err(DriverError::InvalidByteCount(65))
    ));

    let mut frame = p3_frame(&[]);
    frame[0] = 2;
    assert!(matches!(
        decode_p3(&frame),
        Err(DriverError::InvalidByteCount(2))
    ));

    // One bad record discards the whole frame
    let frame = p3_frame(&[
        [0x03, 0x00, 0x10, 0x00, 0x20, 0x00],
        [0x07, 0x01, 0x10, 0x00, 0x20, 0x00],
    ]);
    assert!(matches!(
        decode_p3(&frame),
        Err(DriverError::InvalidTouchStatus(0x07))
    ));

    let frame = p3_frame(&[[0x03, 0x10, 0x10, 0x00, 0x20, 0x00]]);
    assert!(matches!(
        decode_p3(&frame),
        Err(DriverError::InvalidSlotId(0x10))
    ));

    Ok(())
}

#[tokio::test]
async fn test_p3_count_clamped() -> Result<(), Box<dyn Error>> {
    let record = [0x03, 0x01, 0x10, 0x00, 0x20, 0x00];
    let mut frame = p3_frame(&[record; 10]);
    // Claim more contacts than fit in the frame
    frame[63] = 40;

    let samples = decode_p3(&frame)?;
    assert_eq!(samples.len(), 10);

    Ok(())
}
