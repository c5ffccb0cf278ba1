//! OTA upgrade server
//!
//! Serves one firmware image file to a target device over the OTA cluster.
//! The server is stateless between commands apart from the configured file
//! path: each request opens the file read-only, answers from it and closes
//! it again. Any mismatch answers NO_IMAGE_AVAILABLE and the transfer stops.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use zcl::status;

/// Size of the standard OTA image header; the fields the server needs sit
/// at fixed little-endian offsets inside it
const HEADER_SIZE: usize = 56;

/// Parsed OTA image file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaFileHeader {
    pub manufacturer_code: u16,
    pub image_type: u16,
    pub file_version: u32,
    pub image_size: u32,
}

impl OtaFileHeader {
    /// Read the header fields from the start of an image file
    pub fn read(file: &mut std::fs::File) -> Option<Self> {
        let mut header = [0u8; HEADER_SIZE];

        file.seek(SeekFrom::Start(0)).ok()?;
        file.read_exact(&mut header).ok()?;

        // manufacturerCode @10, imageType @12, fileVersion @14, imageSize @52
        Some(Self {
            manufacturer_code: u16::from_le_bytes([header[10], header[11]]),
            image_type: u16::from_le_bytes([header[12], header[13]]),
            file_version: u32::from_le_bytes([header[14], header[15], header[16], header[17]]),
            image_size: u32::from_le_bytes([header[52], header[53], header[54], header[55]]),
        })
    }
}

/// A ZCL response the coordinator should send back on the OTA cluster
pub struct OtaReply {
    pub command_id: u8,
    pub payload: Vec<u8>,
}

/// OTA upgrade server state: just the image path for the active transfer
#[derive(Default)]
pub struct OtaServer {
    file: Option<PathBuf>,
}

impl OtaServer {
    /// Arm the server with an image file; returns the image-notify payload
    /// to kick the device, or `None` when the file is unusable
    pub fn start(&mut self, path: &Path) -> Option<Vec<u8>> {
        if !path.exists() {
            return None;
        }

        self.file = Some(path.to_path_buf());

        // {payload type, query jitter}
        Some(vec![0x00, 0x64])
    }

    fn header(&self) -> Option<(std::fs::File, OtaFileHeader)> {
        let path = self.file.as_ref()?;
        let mut file = std::fs::File::open(path).ok()?;
        let header = OtaFileHeader::read(&mut file)?;
        Some((file, header))
    }

    /// Handle an OTA cluster command from the device. Returns the reply to
    /// enqueue, if any.
    pub fn handle_command(
        &mut self,
        device_name: &str,
        command_id: u8,
        payload: &[u8],
    ) -> Option<OtaReply> {
        match command_id {
            // next-image-request {mfg, imageType, fileVersion}
            0x01 => {
                if payload.len() < 8 {
                    return None;
                }

                let manufacturer_code = u16::from_le_bytes([payload[0], payload[1]]);
                let image_type = u16::from_le_bytes([payload[2], payload[3]]);
                let file_version =
                    u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);

                let Some((_, header)) = self.header() else {
                    return Some(no_image(0x02));
                };

                if manufacturer_code != header.manufacturer_code
                    || image_type != header.image_type
                {
                    return Some(no_image(0x02));
                }

                if file_version == header.file_version {
                    tracing::info!(
                        "Device {} OTA upgrade not started, version match: {:#010X}",
                        device_name,
                        file_version
                    );
                    return Some(no_image(0x02));
                }

                tracing::info!("Device {} OTA upgrade started...", device_name);

                let mut reply = vec![status::SUCCESS];
                reply.extend_from_slice(&header.manufacturer_code.to_le_bytes());
                reply.extend_from_slice(&header.image_type.to_le_bytes());
                reply.extend_from_slice(&header.file_version.to_le_bytes());
                reply.extend_from_slice(&header.image_size.to_le_bytes());

                Some(OtaReply {
                    command_id: 0x02,
                    payload: reply,
                })
            }

            // image-block-request {mfg, imageType, fileVersion, fileOffset, dataSizeMax}
            0x03 => {
                if payload.len() < 13 {
                    return None;
                }

                let manufacturer_code = u16::from_le_bytes([payload[0], payload[1]]);
                let image_type = u16::from_le_bytes([payload[2], payload[3]]);
                let file_version =
                    u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
                let file_offset =
                    u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]);
                let data_size_max = payload[12];

                let Some((mut file, header)) = self.header() else {
                    return Some(no_image(0x05));
                };

                if manufacturer_code != header.manufacturer_code
                    || image_type != header.image_type
                    || file_version != header.file_version
                {
                    return Some(no_image(0x05));
                }

                let mut block = vec![0u8; data_size_max as usize];
                let read = file
                    .seek(SeekFrom::Start(u64::from(file_offset)))
                    .and_then(|_| file.read(&mut block))
                    .unwrap_or(0);
                block.truncate(read);

                tracing::info!(
                    "Device {} OTA upgrade writing {} bytes with offset {:#010X}",
                    device_name,
                    block.len(),
                    file_offset
                );

                let mut reply = vec![status::SUCCESS];
                reply.extend_from_slice(&manufacturer_code.to_le_bytes());
                reply.extend_from_slice(&image_type.to_le_bytes());
                reply.extend_from_slice(&file_version.to_le_bytes());
                reply.extend_from_slice(&file_offset.to_le_bytes());
                reply.push(block.len() as u8);
                reply.extend_from_slice(&block);

                Some(OtaReply {
                    command_id: 0x05,
                    payload: reply,
                })
            }

            // upgrade-end-request {status, mfg, imageType, fileVersion}
            0x06 => {
                if payload.len() < 9 {
                    return None;
                }

                self.file = None;

                let request_status = payload[0];

                if request_status != 0 {
                    tracing::warn!(
                        "Device {} OTA upgrade failed, status code: {:02X}",
                        device_name,
                        request_status
                    );
                    return None;
                }

                tracing::info!("Device {} OTA upgrade finished successfully", device_name);

                // Echo the triple, currentTime = upgradeTime = 0 so the
                // device applies immediately
                let mut reply = Vec::with_capacity(16);
                reply.extend_from_slice(&payload[1..9]);
                reply.extend_from_slice(&0u32.to_le_bytes());
                reply.extend_from_slice(&0u32.to_le_bytes());

                Some(OtaReply {
                    command_id: 0x07,
                    payload: reply,
                })
            }

            _ => {
                tracing::warn!(
                    "Unrecognized OTA upgrade command {:#04X} received from device {}",
                    command_id,
                    device_name
                );
                None
            }
        }
    }
}

fn no_image(command_id: u8) -> OtaReply {
    OtaReply {
        command_id,
        payload: vec![status::NO_IMAGE_AVAILABLE],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn image(manufacturer_code: u16, image_type: u16, file_version: u32, body: &[u8]) -> PathBuf {
        let mut header = vec![0u8; HEADER_SIZE];
        header[10..12].copy_from_slice(&manufacturer_code.to_le_bytes());
        header[12..14].copy_from_slice(&image_type.to_le_bytes());
        header[14..18].copy_from_slice(&file_version.to_le_bytes());
        header[52..56].copy_from_slice(&(HEADER_SIZE as u32 + body.len() as u32).to_le_bytes());

        let path = std::env::temp_dir().join(format!(
            "zigbee-core-ota-{manufacturer_code:04x}-{file_version:08x}.bin"
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&header).unwrap();
        file.write_all(body).unwrap();
        path
    }

    fn next_image_request(manufacturer_code: u16, image_type: u16, file_version: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&manufacturer_code.to_le_bytes());
        payload.extend_from_slice(&image_type.to_le_bytes());
        payload.extend_from_slice(&file_version.to_le_bytes());
        payload
    }

    #[test]
    fn test_version_match_is_rejected() {
        let path = image(0x100B, 0x0101, 0x0001_0203, &[0xAA; 64]);
        let mut server = OtaServer::default();
        server.start(&path).unwrap();

        let reply = server
            .handle_command("plug", 0x01, &next_image_request(0x100B, 0x0101, 0x0001_0203))
            .unwrap();

        assert_eq!(reply.command_id, 0x02);
        assert_eq!(reply.payload, vec![status::NO_IMAGE_AVAILABLE]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_manufacturer_mismatch_is_rejected() {
        let path = image(0x100B, 0x0101, 0x0001_0203, &[0xAA; 64]);
        let mut server = OtaServer::default();
        server.start(&path).unwrap();

        let reply = server
            .handle_command("plug", 0x01, &next_image_request(0x1234, 0x0101, 0x0001_0000))
            .unwrap();

        assert_eq!(reply.payload, vec![status::NO_IMAGE_AVAILABLE]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_block_transfer() {
        let body: Vec<u8> = (0..128u8).collect();
        let path = image(0x100B, 0x0101, 0x0002_0000, &body);
        let mut server = OtaServer::default();
        server.start(&path).unwrap();

        // Accept the offer
        let offer = server
            .handle_command("plug", 0x01, &next_image_request(0x100B, 0x0101, 0x0001_0000))
            .unwrap();
        assert_eq!(offer.command_id, 0x02);
        assert_eq!(offer.payload[0], status::SUCCESS);

        // Request 32 bytes at the start of the body
        let mut request = next_image_request(0x100B, 0x0101, 0x0002_0000);
        request.extend_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
        request.push(32);

        let block = server.handle_command("plug", 0x03, &request).unwrap();
        assert_eq!(block.command_id, 0x05);
        assert_eq!(block.payload[0], status::SUCCESS);
        assert_eq!(block.payload[13], 32); // dataSize
        assert_eq!(&block.payload[14..46], &body[0..32]);

        // Finish
        let mut end = vec![0x00];
        end.extend_from_slice(&next_image_request(0x100B, 0x0101, 0x0002_0000));
        let done = server.handle_command("plug", 0x06, &end).unwrap();
        assert_eq!(done.command_id, 0x07);
        assert_eq!(done.payload.len(), 16);
        assert_eq!(&done.payload[8..16], &[0u8; 8]); // apply immediately

        let _ = std::fs::remove_file(&path);
    }
}
