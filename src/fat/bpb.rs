//! The BIOS Parameter Block, as found in the boot sector of a FAT12
//! volume.
//!
//! Fields are read straight out of the raw block at their fixed offsets;
//! the block is never reinterpreted as a packed struct, so this works on
//! any alignment and endianness.

use byteorder::{ByteOrder, LittleEndian};

use crate::{fat::MAX_CLUSTER_COUNT, BLOCK_LEN};

/// A borrowed view over the 512 bytes of a boot sector.
#[derive(Debug)]
pub struct Bpb<'a> {
    data: &'a [u8; BLOCK_LEN as usize],
}

impl<'a> Bpb<'a> {
    const FOOTER_VALUE: u16 = 0xAA55;

    /// Wrap a boot-sector block, validating the signature and the
    /// geometry fields. The returned error names the failed check.
    pub fn create_from_bytes(data: &'a [u8; BLOCK_LEN as usize]) -> Result<Bpb<'a>, &'static str> {
        let bpb = Bpb { data };
        if bpb.footer() != Self::FOOTER_VALUE {
            return Err("bad boot sector signature");
        }
        if u32::from(bpb.bytes_per_block()) != BLOCK_LEN {
            return Err("unsupported bytes per sector");
        }
        if !bpb.blocks_per_cluster().is_power_of_two() {
            return Err("bad sectors per cluster");
        }
        if bpb.num_fats() != 1 && bpb.num_fats() != 2 {
            return Err("bad number of FAT copies");
        }
        if bpb.root_entries_count() == 0 {
            return Err("no root directory");
        }
        if (u32::from(bpb.root_entries_count()) * 32) % u32::from(bpb.bytes_per_block()) != 0 {
            return Err("root directory not sector aligned");
        }
        if bpb.total_blocks16() == 0 && bpb.total_blocks32() == 0 {
            return Err("no total sector count");
        }
        if bpb.fat_size16() == 0 {
            return Err("no FAT size");
        }
        Ok(bpb)
    }

    // FAT12 fields, in offset order.

    /// Bytes per logical sector (offset 11).
    pub fn bytes_per_block(&self) -> u16 {
        LittleEndian::read_u16(&self.data[11..13])
    }

    /// Sectors per cluster (offset 13). Always a power of two.
    pub fn blocks_per_cluster(&self) -> u8 {
        self.data[13]
    }

    /// Sectors before the first FAT copy (offset 14).
    pub fn reserved_block_count(&self) -> u16 {
        LittleEndian::read_u16(&self.data[14..16])
    }

    /// Number of FAT copies (offset 16).
    pub fn num_fats(&self) -> u8 {
        self.data[16]
    }

    /// Capacity of the root directory, in 32-byte entries (offset 17).
    pub fn root_entries_count(&self) -> u16 {
        LittleEndian::read_u16(&self.data[17..19])
    }

    /// 16-bit total sector count (offset 19). Zero when the volume uses
    /// the 32-bit count instead.
    pub fn total_blocks16(&self) -> u16 {
        LittleEndian::read_u16(&self.data[19..21])
    }

    /// Sectors per FAT copy (offset 22).
    pub fn fat_size16(&self) -> u16 {
        LittleEndian::read_u16(&self.data[22..24])
    }

    /// 32-bit total sector count (offset 32).
    pub fn total_blocks32(&self) -> u32 {
        LittleEndian::read_u32(&self.data[32..36])
    }

    /// Volume label from the extended BPB (offset 43).
    pub fn volume_label(&self) -> [u8; 11] {
        let mut label = [0u8; 11];
        label.copy_from_slice(&self.data[43..54]);
        label
    }

    /// Boot signature word (offset 510).
    pub fn footer(&self) -> u16 {
        LittleEndian::read_u16(&self.data[510..512])
    }

    /// Total sector count, whichever field is in use.
    pub fn total_blocks(&self) -> u32 {
        if self.total_blocks16() != 0 {
            u32::from(self.total_blocks16())
        } else {
            self.total_blocks32()
        }
    }

    /// Number of sectors occupied by the root directory region.
    pub fn root_dir_blocks(&self) -> u32 {
        (u32::from(self.root_entries_count()) * 32) / u32::from(self.bytes_per_block())
    }

    /// Number of data clusters on the volume.
    pub fn cluster_count(&self) -> u32 {
        let non_data = u32::from(self.reserved_block_count())
            + u32::from(self.num_fats()) * u32::from(self.fat_size16())
            + self.root_dir_blocks();
        let data_blocks = self.total_blocks().saturating_sub(non_data);
        data_blocks / u32::from(self.blocks_per_cluster())
    }

    /// Whether the cluster count fits the 12-bit FAT this crate decodes.
    pub fn is_fat12(&self) -> bool {
        self.cluster_count() < MAX_CLUSTER_COUNT
    }
}

// ****************************************************************************
//
// Unit Tests
//
// ****************************************************************************


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
