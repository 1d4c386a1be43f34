use std::{io::Read, ptr::NonNull};

use firstfit::{Heap, Region, SbrkRegion};
use libc::sbrk;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations move the program break.
fn block_until_enter_pressed(pause: bool) {
  if !pause {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break next to the end of the heap's region.
fn print_program_break(
  label: &str,
  heap: &Heap<SbrkRegion>,
) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}, region = {} bytes",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
    heap.region().len(),
  );
}

fn print_alloc(
  size: usize,
  ptr: Option<NonNull<u8>>,
  heap: &Heap<SbrkRegion>,
) {
  println!(
    "Allocated {} bytes, address = {:?}, region end = {:?}",
    size,
    ptr,
    heap.region().end()
  );
}

fn main() {
  env_logger::init();

  let pause = !std::env::args().any(|arg| arg == "--no-pause");

  // The system allocator must set up its arena before the heap claims the break.
  println!("firstfit demo (pass --no-pause to run straight through)");

  let region = match SbrkRegion::new() {
    Ok(region) => region,
    Err(error) => {
      eprintln!("cannot start a heap at the program break: {error}");
      std::process::exit(1);
    }
  };
  let mut heap = Heap::new(region);

  print_program_break("start", &heap);
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 1) Two arrays of ten i32, written and read back.
  // --------------------------------------------------------------------
  let a = heap.allocate(10 * size_of::<i32>());
  let b = heap.allocate(10 * size_of::<i32>());
  println!("\n[1] Allocate two [i32; 10]");
  print_alloc(40, a, &heap);
  print_alloc(40, b, &heap);

  let (Some(a_ptr), Some(b_ptr)) = (a, b) else {
    eprintln!("allocation failed");
    std::process::exit(1);
  };

  unsafe {
    for i in 0..10 {
      a_ptr.cast::<i32>().add(i).write(i as i32 + 1);
      b_ptr.cast::<i32>().add(i).write(-(i as i32) - 1);
    }
    println!(
      "[1] a[9] = {}, b[9] = {}",
      a_ptr.cast::<i32>().add(9).read(),
      b_ptr.cast::<i32>().add(9).read()
    );
  }

  print!("{heap}");
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 2) Release the first array. It stays on the list as a free block
  //    because the second one still holds the region's end.
  // --------------------------------------------------------------------
  unsafe { heap.release(a) };
  println!("\n[2] Released a");
  print!("{heap}");
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 3) A smaller request reuses a's block (first fit), without splitting:
  //    40 - 16 leaves no room for another block.
  // --------------------------------------------------------------------
  let c = heap.allocate(16);
  println!("\n[3] Allocate 16 bytes");
  print_alloc(16, c, &heap);
  println!(
    "[3] c == a? {}",
    if c == a {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 4) A large block to observe region growth.
  // --------------------------------------------------------------------
  print_program_break("before large alloc", &heap);

  let big = heap.allocate(64 * 1024);
  println!("\n[4] Allocate large 64 KiB block");
  print_alloc(64 * 1024, big, &heap);

  print_program_break("after large alloc", &heap);
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 5) Release everything. The merged tail goes back to the OS, so the
  //    break ends where it started.
  // --------------------------------------------------------------------
  unsafe {
    heap.release(c);
    heap.release(big);
    heap.release(b);
  }
  println!("\n[5] Released everything");
  print!("{heap}");

  if let Err(corruption) = heap.check() {
    eprintln!("heap corrupted: {corruption}");
    std::process::exit(1);
  }

  print_program_break("end", &heap);
}
