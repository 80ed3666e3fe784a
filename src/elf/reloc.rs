// 从重定位条目的 r_info 字段提取符号索引和重定位类型，按 ELF class 选择编码

use super::ElfXword;

// ELF64：高 32 位为符号索引，低 32 位为类型
#[cfg(target_pointer_width = "64")]
pub(crate) fn elf_r_sym(info: ElfXword) -> u32 {
    (info >> 32) as u32
}

#[cfg(target_pointer_width = "64")]
pub(crate) fn elf_r_type(info: ElfXword) -> u32 {
    (info & 0xffff_ffff) as u32
}

#[cfg(target_pointer_width = "64")]
pub(crate) fn elf_r_info(sym: u32, r_type: u32) -> ElfXword {
    ((sym as u64) << 32) | r_type as u64
}

// ELF32：高 24 位为符号索引，低 8 位为类型
#[cfg(target_pointer_width = "32")]
pub(crate) fn elf_r_sym(info: ElfXword) -> u32 {
    info >> 8
}

#[cfg(target_pointer_width = "32")]
pub(crate) fn elf_r_type(info: ElfXword) -> u32 {
    info & 0xff
}

#[cfg(target_pointer_width = "32")]
pub(crate) fn elf_r_info(sym: u32, r_type: u32) -> ElfXword {
    (sym << 8) | (r_type & 0xff)
}
