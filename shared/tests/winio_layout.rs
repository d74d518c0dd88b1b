use shared::winio::*;

#[test]
fn control_codes_match_the_driver_header() {
    assert_eq!(IOCTL_WINIO_MAPPHYSTOLIN, 0x8010_2040);
    assert_eq!(IOCTL_WINIO_UNMAPPHYSADDR, 0x8010_2044);
    assert_eq!(IOCTL_WINIO_ENABLEDIRECTIO, 0x8010_2048);
    assert_eq!(IOCTL_WINIO_DISABLEDIRECTIO, 0x8010_204C);
}

#[test]
fn descriptor_is_forty_bytes_without_padding() {
    assert_eq!(std::mem::size_of::<PhysStruct>(), PHYS_STRUCT_SIZE);
    assert_eq!(std::mem::align_of::<PhysStruct>(), 8);
}

#[test]
fn map_request_places_fields_at_driver_offsets() {
    let request = PhysStruct::map_request(0xF7F0_0000, 4);
    let bytes = request.to_bytes();

    assert_eq!(&bytes[0..8], &4u64.to_le_bytes());
    assert_eq!(&bytes[8..16], &0xF7F0_0000u64.to_le_bytes());
    assert!(bytes[16..].iter().all(|b| *b == 0));
}

#[test]
fn driver_reply_is_decoded_field_by_field() {
    let mut reply = PhysStruct::map_request(0x1000, 4).to_bytes();
    reply[24..32].copy_from_slice(&0xFFFF_8000_0000_1000u64.to_le_bytes());
    reply[16..24].copy_from_slice(&0x2C4u64.to_le_bytes());

    let parsed = PhysStruct::from_bytes(&reply).unwrap();
    assert_eq!(parsed.phys_mem_lin, 0xFFFF_8000_0000_1000);
    assert_eq!(parsed.physical_memory_handle, 0x2C4);
    assert_eq!(parsed.phys_address, 0x1000);
}

#[test]
fn short_reply_is_rejected() {
    assert!(PhysStruct::from_bytes(&[0u8; 39]).is_none());
}
