//! End-to-end pipeline tests over synthetic objdump input.

use pretty_assertions::assert_eq;

use romlayout::config::LayoutPolicy;
use romlayout::parse::scan_config;
use romlayout::pipeline::{plan_rom, BuildInput};
use romlayout::section::{Category, UnitId};

const DUMP16: &str = "\
rom16.o:     file format elf32-i386

Sections:
Idx Name          Size      VMA       LMA       File off  Algn
  0 .fixedaddr.0xe000 00000010  00000000  00000000  00000034  2**0
  1 .text.handle_irq 00000020  00000000  00000000  00000044  2**0
  2 .text.unused  00000030  00000000  00000000  00000064  2**0
SYMBOL TABLE:
00000000 g     F .fixedaddr.0xe000\t00000010 reset_vector
00000000 g     F .text.handle_irq\t00000020 handle_irq
00000000 g     F .text.unused\t00000030 unused

RELOCATION RECORDS FOR [.fixedaddr.0xe000]:
OFFSET   TYPE              VALUE
00000002 R_386_PC32        handle_irq
00000006 R_386_32          _cfunc32flat_main
0000000a R_386_PC32        trampoline32
";

const DUMP32SEG: &str = "\
rom32seg.o:     file format elf32-i386

Sections:
Idx Name          Size      VMA       LMA       File off  Algn
  0 .text.asm.trampoline32 00000010  00000000  00000000  00000034  2**0
SYMBOL TABLE:
00000000 g     F .text.asm.trampoline32\t00000010 trampoline32
";

const DUMP32FLAT: &str = "\
rom32flat.o:     file format elf32-i386

Sections:
Idx Name          Size      VMA       LMA       File off  Algn
  0 .text.main    00000040  00000000  00000000  00000034  2**4
  1 .text.init.setup 00000020  00000000  00000000  00000074  2**4
  2 .data.varlow.cursor 00000010  00000000  00000000  00000094  2**4
  3 .rodata.str1.1 00000008  00000000  00000000  000000a4  2**0
SYMBOL TABLE:
00000000 g     F .text.main\t00000040 main
00000000 g     F .text.init.setup\t00000020 setup
00000004 g       .data.varlow.cursor\t00000004 cursor
00000000 g       *ABS*\t00000000 _reloc_abs_start

RELOCATION RECORDS FOR [.text.main]:
OFFSET   TYPE              VALUE
00000004 R_386_PC32        setup
00000008 R_386_32          cursor
0000000c R_386_32          .rodata.str1.1

RELOCATION RECORDS FOR [.text.init.setup]:
OFFSET   TYPE              VALUE
00000010 R_386_32          setup
00000014 R_386_PC32        main
";

fn build_input() -> BuildInput {
    let mut input = BuildInput::new();
    input.parse_unit(UnitId::Code16, DUMP16);
    input.parse_unit(UnitId::Code32Seg, DUMP32SEG);
    input.parse_unit(UnitId::Code32Flat, DUMP32FLAT);
    input
}

fn section_id(input: &BuildInput, name: &str) -> usize {
    input
        .sections
        .iter()
        .position(|s| s.name == name)
        .unwrap_or_else(|| panic!("section {} not parsed", name))
}

#[test]
fn runtime_and_init_sections_split_without_errors() {
    let mut input = build_input();
    let options = scan_config("");
    let scripts = plan_rom(&mut input, &options, &LayoutPolicy::default()).unwrap();

    // Runtime flat code stays in its unit zone; the init-only helper is
    // separated even though runtime code calls into it.
    let main = section_id(&input, ".text.main");
    let setup = section_id(&input, ".text.init.setup");
    assert_eq!(
        input.sections[main].category,
        Some(Category::Unit(UnitId::Code32Flat))
    );
    assert_eq!(input.sections[setup].category, Some(Category::Init));

    // Dead code is dropped from every script.
    let unused = section_id(&input, ".text.unused");
    assert_eq!(input.sections[unused].category, None);
    assert_eq!(input.sections[unused].final_loc, None);
    assert!(!scripts.out16.contains(".text.unused"));
    assert!(!scripts.out32flat.contains(".text.unused"));
}

#[test]
fn scripts_carry_the_computed_addresses() {
    let mut input = build_input();
    let options = scan_config("");
    let scripts = plan_rom(&mut input, &options, &LayoutPolicy::default()).unwrap();

    // 16-bit script: segment-relative placements under the fixed region,
    // cross-unit symbol values, and the low-memory segment base.
    assert!(scripts
        .out16
        .contains(".fixedaddr.0xe000 0xe000 : { *(.fixedaddr.0xe000) }"));
    assert!(scripts
        .out16
        .contains(".text.handle_irq 0xe010 : { *(.text.handle_irq) }"));
    assert!(scripts.out16.contains("_cfunc32flat_main = 0xfdfa0 ;"));
    assert!(scripts.out16.contains("trampoline32 = 0xdff0 ;"));
    assert!(scripts.out16.contains("zonelow_base = 0x90000 ;"));
    assert!(scripts.out16.contains("_zonelow_seg = 0x9000 ;"));
    assert!(scripts.out16.contains("/DISCARD/"));

    // 32seg script places its only section right below the 16-bit zone.
    assert!(scripts
        .out32seg
        .contains(".text.asm.trampoline32 0xdff0 : { *(.text.asm.trampoline32) }"));

    // Flat script: zone boundary symbols.
    assert!(scripts.out32flat.contains("code32init_start = 0xfdf80 ;"));
    assert!(scripts.out32flat.contains("code32init_end = 0xfdfa0 ;"));
    assert!(scripts.out32flat.contains("varlow_start = 0xfdf70 ;"));
    assert!(scripts.out32flat.contains("varlow_end = 0xfdf80 ;"));
    assert!(scripts.out32flat.contains("final_varlow_start = 0x9fff0 ;"));
    assert!(scripts.out32flat.contains("zonefseg_start = 0xf0000 ;"));
    assert!(scripts.out32flat.contains("zonefseg_end = 0xfdfa0 ;"));
    assert!(scripts.out32flat.contains("_reloc_min_align = 0x10 ;"));

    // Three fixup entries, so the flat start drops by 12 bytes below the
    // low-memory zone start.
    assert!(scripts.out32flat.contains("code32flat_start = 0xfdf64 ;"));
    assert!(scripts
        .out32flat
        .contains("LONG(0xfdf90 - code32init_start)"));
    assert!(scripts
        .out32flat
        .contains("LONG(0xfdf94 - code32init_start)"));
    assert!(scripts
        .out32flat
        .contains("LONG(0xfdfa4 - code32flat_start)"));

    // Low-memory variable exported with the boot-time relocation applied.
    assert!(scripts.out32flat.contains("cursor = 0x9fff4 ;"));

    // Relative placement directives in ascending address order, with the
    // read-only string marker in front of its section.
    let varlow_pos = scripts
        .out32flat
        .find("*32flat.*(.data.varlow.cursor)")
        .unwrap();
    let init_pos = scripts.out32flat.find("*32flat.*(.text.init.setup)").unwrap();
    let main_pos = scripts.out32flat.find("*32flat.*(.text.main)").unwrap();
    let fixed_pos = scripts.out32flat.find("*16.*(.fixedaddr.0xe000)").unwrap();
    assert!(varlow_pos < init_pos && init_pos < main_pos && main_pos < fixed_pos);
    assert!(scripts.out32flat.contains("_rodata32flat = . ;"));

    // Entry declaration and load header.
    assert!(scripts.out32flat.contains("ENTRY(reset_vector)"));
    assert!(scripts.out32flat.contains("text PT_LOAD AT ( code32flat_start ) ;"));
}

#[test]
fn upper_memory_allocations_move_the_lowmem_base() {
    let mut input = build_input();
    let options = scan_config("#define CONFIG_MALLOC_UPPERMEMORY 1\n");
    let scripts = plan_rom(&mut input, &options, &LayoutPolicy::default()).unwrap();

    // The boot-time copy now sits just below the read-only region.
    assert!(scripts.out32flat.contains("zonelow_base = 0xe0000 ;"));
    assert!(scripts.out32flat.contains("final_varlow_start = 0xefff0 ;"));
}

#[test]
fn layout_addresses_are_deterministic() {
    let mut first = build_input();
    let mut second = build_input();
    let options = scan_config("");
    let policy = LayoutPolicy::default();
    let a = plan_rom(&mut first, &options, &policy).unwrap();
    let b = plan_rom(&mut second, &options, &policy).unwrap();

    assert_eq!(a.out16, b.out16);
    assert_eq!(a.out32seg, b.out32seg);
    assert_eq!(a.out32flat, b.out32flat);
}

#[test]
fn runtime_reference_into_varinit_data_is_fatal() {
    let dump16 = "\
Sections:
Idx Name          Size      VMA       LMA       File off  Algn
  0 .fixedaddr.0xe000 00000010  00000000  00000000  00000034  2**0
SYMBOL TABLE:
00000000 g     F .fixedaddr.0xe000\t00000010 reset_vector

RELOCATION RECORDS FOR [.fixedaddr.0xe000]:
OFFSET   TYPE              VALUE
00000002 R_386_32          _cfunc32flat_probe
";
    let dump32flat = "\
Sections:
Idx Name          Size      VMA       LMA       File off  Algn
  0 .data.varinit.tables 00000010  00000000  00000000  00000034  2**4
  1 .text.probe   00000010  00000000  00000000  00000054  2**4
SYMBOL TABLE:
00000000 g       .data.varinit.tables\t00000010 tables
00000000 g     F .text.probe\t00000010 probe

RELOCATION RECORDS FOR [.text.probe]:
OFFSET   TYPE              VALUE
00000004 R_386_32          tables
";
    let mut input = BuildInput::new();
    input.parse_unit(UnitId::Code16, dump16);
    input.parse_unit(UnitId::Code32Flat, dump32flat);

    // Runtime chain: fixed entry vector -> probe -> init-only-verified data.
    let options = scan_config("");
    let err = plan_rom(&mut input, &options, &LayoutPolicy::default()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains(".data.varinit.tables"));
    assert!(message.contains(".text.probe"));
    assert!(message.contains(".fixedaddr.0xe000"));
}

#[test]
fn missing_entry_symbol_is_fatal() {
    let mut input = BuildInput::new();
    input.parse_unit(UnitId::Code16, "Sections:\n");
    let options = scan_config("");
    let err = plan_rom(&mut input, &options, &LayoutPolicy::default()).unwrap_err();
    assert!(err.to_string().contains("reset_vector"));
}
