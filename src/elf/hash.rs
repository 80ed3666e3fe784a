// ELF SysV 符号哈希算法，必须与动态链接器构建 DT_HASH 表的算法逐字节一致

pub(crate) fn elf_hash(name: &[u8]) -> u32 {
    let mut h: u32 = 0;
    let mut g: u32;
    for &ch in name {
        h = (h << 4).wrapping_add(ch as u32);
        g = h & 0xf000_0000;
        h ^= g;
        h ^= g >> 24;
    }
    h
}
